//! Per-connection message dispatch.
//!
//! Decoded client messages are routed to the ride orchestrator or the
//! mesh relay; replies go back to the requesting connection through the
//! hub. Every rejected ride operation yields exactly one typed error
//! event to the requester and nothing to anyone else.

use std::sync::Arc;
use tracing::{debug, info};

use ridecall_core::error::Error;
use ridecall_core::events::ServerEvent;
use ridecall_core::hub::MessageHub;
use ridecall_core::models::ParticipantId;
use ridecall_core::ride::RideService;

use crate::mesh::MeshRelay;
use crate::messages::ClientMessage;

pub struct Gateway {
    rides: Arc<RideService>,
    hub: Arc<MessageHub>,
    mesh: MeshRelay,
}

impl Gateway {
    #[must_use]
    pub fn new(rides: Arc<RideService>, hub: Arc<MessageHub>) -> Self {
        let mesh = MeshRelay::new(Arc::clone(&hub));
        Self { rides, hub, mesh }
    }

    pub async fn handle(&self, connection_id: &ParticipantId, message: ClientMessage) {
        debug!(connection_id = %connection_id, message = ?message, "dispatching client message");
        match message {
            ClientMessage::JoinRide { ride_id, role } => {
                match self.rides.join(&ride_id, connection_id, role).await {
                    Ok(capabilities) => {
                        self.hub.send_to(
                            connection_id,
                            ServerEvent::RouterCapabilities { capabilities },
                        );
                    }
                    Err(err) => self.reply_error(connection_id, &err),
                }
            }

            ClientMessage::ShareRide { ride_id } => {
                let link = self.rides.share(&ride_id);
                self.hub
                    .send_to(connection_id, ServerEvent::ShareLinkGenerated { link });
            }

            ClientMessage::JoinSharedRide { link } => {
                match self.rides.join_shared_ride(&link, connection_id) {
                    Ok(ride_id) => {
                        self.hub
                            .send_to(connection_id, ServerEvent::JoinedSharedRide { ride_id });
                    }
                    Err(Error::InvalidLink) => {
                        self.hub.send_to(connection_id, ServerEvent::InvalidLink);
                    }
                    Err(err) => self.reply_error(connection_id, &err),
                }
            }

            ClientMessage::LeaveRide => {
                self.rides.leave(connection_id).await;
            }

            ClientMessage::CreateTransport { ride_id } => {
                match self.rides.create_transport(&ride_id, connection_id).await {
                    Ok(transport) => {
                        self.hub.send_to(
                            connection_id,
                            ServerEvent::TransportCreated {
                                transport_id: transport.id.clone(),
                                parameters: transport.parameters.clone(),
                            },
                        );
                    }
                    Err(err) => {
                        self.hub.send_to(
                            connection_id,
                            ServerEvent::TransportError {
                                error: err.client_message(),
                            },
                        );
                    }
                }
            }

            ClientMessage::Produce {
                ride_id,
                kind,
                rtp_parameters,
            } => {
                match self
                    .rides
                    .produce(&ride_id, connection_id, kind, rtp_parameters)
                    .await
                {
                    Ok(producer_id) => {
                        self.hub
                            .send_to(connection_id, ServerEvent::ProducerCreated { producer_id });
                    }
                    Err(err) => {
                        self.hub.send_to(
                            connection_id,
                            ServerEvent::ProduceError {
                                error: err.client_message(),
                            },
                        );
                    }
                }
            }

            ClientMessage::Consume {
                ride_id,
                producer_id,
                rtp_capabilities,
            } => {
                match self
                    .rides
                    .consume(&ride_id, connection_id, &producer_id, rtp_capabilities)
                    .await
                {
                    Ok(consumer) => {
                        self.hub.send_to(
                            connection_id,
                            ServerEvent::ConsumerCreated {
                                consumer_id: consumer.id.clone(),
                                producer_id: consumer.producer_id.clone(),
                            },
                        );
                    }
                    Err(err) => {
                        self.hub.send_to(
                            connection_id,
                            ServerEvent::ConsumeError {
                                error: err.client_message(),
                            },
                        );
                    }
                }
            }

            ClientMessage::JoinRoom { room_id } => self.mesh.join_room(room_id, connection_id),
            ClientMessage::Offer { room_id, sdp } => self.mesh.offer(room_id, sdp, connection_id),
            ClientMessage::Answer { room_id, sdp } => self.mesh.answer(room_id, sdp, connection_id),
            ClientMessage::Candidate { room_id, candidate } => {
                self.mesh.candidate(room_id, candidate, connection_id);
            }
            ClientMessage::RequestOffer { room_id } => {
                self.mesh.request_offer(room_id, connection_id);
            }
        }
    }

    /// Reply for a malformed frame that never decoded into a message.
    pub fn reject_malformed(&self, connection_id: &ParticipantId) {
        self.hub.send_to(
            connection_id,
            ServerEvent::RideError {
                code: "bad_message".to_string(),
                error: "Malformed message".to_string(),
            },
        );
    }

    /// Connection teardown: same cleanup as an explicit leave, then drop
    /// the connection from the hub.
    pub async fn handle_disconnect(&self, connection_id: &ParticipantId) {
        info!(connection_id = %connection_id, "connection closed, cleaning up");
        self.rides.leave(connection_id).await;
        self.hub.deregister(connection_id);
    }

    fn reply_error(&self, connection_id: &ParticipantId, err: &Error) {
        self.hub.send_to(
            connection_id,
            ServerEvent::RideError {
                code: err.code().to_string(),
                error: err.client_message(),
            },
        );
    }
}
