//! Process group and point-to-point channels
//!
//! A group of `size` participants is formed around a rendezvous address:
//! - Rank 0 (coordinator) listens on the address and accepts one connection
//!   per worker
//! - Ranks 1..size connect to it and register with a HELLO frame
//!
//! The result is a star: the coordinator holds a channel to every worker,
//! each worker holds a channel to the coordinator only. Worker-to-worker
//! traffic has no channel and fails with [`TransportError::NoChannel`].

use crate::error::TransportError;
use crate::exchange::protocol::*;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Instant};

/// Delay between connection attempts while the coordinator is not yet listening
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// How a participant joins its group
#[derive(Debug, Clone)]
pub struct GroupSpec {
    /// This participant's ordinal
    pub rank: usize,

    /// Total participant count
    pub size: usize,

    /// Rendezvous address (rank 0 binds it, others connect to it)
    pub coordinator_addr: String,

    /// Upper bound on group formation
    pub join_timeout: Duration,
}

/// What `discover()` tells a participant about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub size: usize,
    pub rank: usize,
    pub processor_name: String,
}

/// Connected member of a process group
pub struct Communicator {
    rank: usize,
    size: usize,
    processor_name: String,

    /// Channel per peer ordinal; `None` where no channel exists
    channels: Vec<Option<TcpStream>>,
}

impl Communicator {
    /// Form the group described by `spec`
    ///
    /// Rank 0 binds `spec.coordinator_addr` and waits for every worker;
    /// other ranks connect to it. Must be called once per participant
    /// before any exchange operation.
    pub async fn discover(spec: &GroupSpec) -> Result<Self, TransportError> {
        if spec.size == 0 || spec.rank >= spec.size {
            return Err(TransportError::InvalidRank {
                rank: spec.rank,
                size: spec.size,
            });
        }

        if spec.rank == 0 {
            let listener = TcpListener::bind(&spec.coordinator_addr)
                .await
                .map_err(|source| TransportError::Connect {
                    addr: spec.coordinator_addr.clone(),
                    source,
                })?;
            Self::coordinator(listener, spec.size, spec.join_timeout).await
        } else {
            Self::worker(&spec.coordinator_addr, spec.rank, spec.size, spec.join_timeout).await
        }
    }

    /// Form the group as rank 0 on an already-bound listener
    ///
    /// Used by the local launcher, which must know the bound port before
    /// spawning the workers.
    pub async fn coordinator(
        listener: TcpListener,
        size: usize,
        join_timeout: Duration,
    ) -> Result<Self, TransportError> {
        if size == 0 {
            return Err(TransportError::InvalidRank { rank: 0, size });
        }

        let processor_name = processor_name();
        let mut channels: Vec<Option<TcpStream>> = (0..size).map(|_| None).collect();
        let deadline = Instant::now() + join_timeout;

        for joined in 1..size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (mut stream, addr) = match timeout(remaining, listener.accept()).await {
                Ok(accepted) => accepted?,
                Err(_) => {
                    return Err(TransportError::Protocol(format!(
                        "Only {} of {} workers joined within {:?}",
                        joined - 1,
                        size - 1,
                        join_timeout
                    )))
                }
            };
            stream.set_nodelay(true)?;
            log::debug!("Accepted connection from {}", addr);

            let remaining = deadline.saturating_duration_since(Instant::now());
            let hello = match timeout(remaining, read_message(&mut stream)).await {
                Ok(Ok(Message::Hello(hello))) => hello,
                Ok(Ok(other)) => {
                    return Err(TransportError::Protocol(format!(
                        "Expected HELLO from {}, got {:?}",
                        addr, other
                    )))
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(TransportError::Protocol(format!(
                        "No HELLO from {} within {:?}",
                        addr, join_timeout
                    )))
                }
            };

            let rejection = if hello.protocol_version != PROTOCOL_VERSION {
                Some(format!(
                    "Protocol version mismatch: coordinator={}, worker={}",
                    PROTOCOL_VERSION, hello.protocol_version
                ))
            } else if hello.size != size {
                Some(format!(
                    "Group size mismatch: coordinator={}, worker={}",
                    size, hello.size
                ))
            } else if hello.rank == 0 || hello.rank >= size {
                Some(format!("Invalid worker rank {} for group of size {}", hello.rank, size))
            } else if channels[hello.rank].is_some() {
                Some(format!("Rank {} joined twice", hello.rank))
            } else {
                None
            };

            if let Some(reason) = rejection {
                let error = ErrorMessage {
                    message: reason.clone(),
                };
                // Best effort: the worker may already be gone
                let _ = write_message(&mut stream, &Message::Error(error)).await;
                return Err(TransportError::Protocol(reason));
            }

            write_message(
                &mut stream,
                &Message::Welcome(WelcomeMessage {
                    protocol_version: PROTOCOL_VERSION,
                }),
            )
            .await?;

            log::info!(
                "Rank {} joined from {} ({})",
                hello.rank,
                hello.processor_name,
                addr
            );
            channels[hello.rank] = Some(stream);
        }

        Ok(Self {
            rank: 0,
            size,
            processor_name,
            channels,
        })
    }

    /// Join the group as a worker
    ///
    /// Retries the connection until the coordinator accepts it or
    /// `join_timeout` expires.
    pub async fn worker(
        coordinator_addr: &str,
        rank: usize,
        size: usize,
        join_timeout: Duration,
    ) -> Result<Self, TransportError> {
        if rank == 0 || rank >= size {
            return Err(TransportError::InvalidRank { rank, size });
        }

        let deadline = Instant::now() + join_timeout;
        let mut stream = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, TcpStream::connect(coordinator_addr)).await {
                Ok(Ok(stream)) => break stream,
                // Attempt hung (e.g. SYNs dropped) until the join deadline
                Err(_) => {
                    return Err(TransportError::Timeout {
                        peer: 0,
                        after: join_timeout,
                    })
                }
                Ok(Err(source)) => {
                    if Instant::now() + CONNECT_RETRY_INTERVAL >= deadline {
                        return Err(TransportError::Connect {
                            addr: coordinator_addr.to_string(),
                            source,
                        });
                    }
                    log::debug!("Coordinator {} not reachable yet: {}", coordinator_addr, source);
                    sleep(CONNECT_RETRY_INTERVAL).await;
                }
            }
        };
        stream.set_nodelay(true)?;

        let processor_name = processor_name();
        let hello = HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            rank,
            size,
            processor_name: processor_name.clone(),
        };
        write_message(&mut stream, &Message::Hello(hello)).await?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, read_message(&mut stream)).await {
            Ok(Ok(Message::Welcome(welcome))) => {
                if welcome.protocol_version != PROTOCOL_VERSION {
                    return Err(TransportError::Protocol(format!(
                        "Protocol version mismatch: coordinator={}, worker={}",
                        welcome.protocol_version, PROTOCOL_VERSION
                    )));
                }
            }
            Ok(Ok(Message::Error(err))) => {
                return Err(TransportError::Protocol(format!(
                    "Coordinator rejected rank {}: {}",
                    rank, err.message
                )))
            }
            Ok(Ok(other)) => {
                return Err(TransportError::Protocol(format!(
                    "Expected WELCOME, got {:?}",
                    other
                )))
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(TransportError::Timeout {
                    peer: 0,
                    after: join_timeout,
                })
            }
        }

        log::info!("Rank {} joined group of {} via {}", rank, size, coordinator_addr);

        let mut channels: Vec<Option<TcpStream>> = (0..size).map(|_| None).collect();
        channels[0] = Some(stream);

        Ok(Self {
            rank,
            size,
            processor_name,
            channels,
        })
    }

    /// Total participant count and this participant's ordinal
    pub fn discovery(&self) -> Discovery {
        Discovery {
            size: self.size,
            rank: self.rank,
            processor_name: self.processor_name.clone(),
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn processor_name(&self) -> &str {
        &self.processor_name
    }

    /// Send `text` to `destination`
    ///
    /// Returns once the payload has been written to the channel.
    pub async fn send(&mut self, text: &str, destination: usize) -> Result<(), TransportError> {
        check_capacity(text, PAYLOAD_CAPACITY)?;
        let source = self.rank;
        let stream = self.channel(destination)?;

        let msg = Message::Payload(PayloadMessage {
            source,
            text: text.to_string(),
        });
        write_message(stream, &msg).await?;

        log::debug!("Rank {} sent {} bytes to rank {}", source, text.len(), destination);
        Ok(())
    }

    /// Receive one payload from `source`, bounded by a `max_len`-byte buffer
    ///
    /// With `wait = None` the call waits indefinitely; otherwise expiry is a
    /// [`TransportError::Timeout`].
    pub async fn receive(
        &mut self,
        max_len: usize,
        source: usize,
        wait: Option<Duration>,
    ) -> Result<String, TransportError> {
        let rank = self.rank;
        let stream = self.channel(source)?;

        let msg = match wait {
            Some(after) => timeout(after, read_message(stream))
                .await
                .map_err(|_| TransportError::Timeout { peer: source, after })??,
            None => read_message(stream).await?,
        };

        match msg {
            Message::Payload(payload) => {
                if payload.source != source {
                    return Err(TransportError::Protocol(format!(
                        "Payload on channel to rank {} claims source {}",
                        source, payload.source
                    )));
                }
                log::debug!(
                    "Rank {} received {} bytes from rank {}",
                    rank,
                    payload.text.len(),
                    source
                );
                Ok(truncate_to(payload.text, max_len))
            }
            Message::Error(err) => Err(TransportError::Protocol(format!(
                "Rank {} reported error: {}",
                source, err.message
            ))),
            other => Err(TransportError::Protocol(format!(
                "Expected PAYLOAD from rank {}, got {:?}",
                source, other
            ))),
        }
    }

    /// Tear down every channel
    pub async fn finalize(mut self) -> Result<(), TransportError> {
        for stream in self.channels.iter_mut().flatten() {
            stream.shutdown().await?;
        }
        log::debug!("Rank {} finalized", self.rank);
        Ok(())
    }

    fn channel(&mut self, peer: usize) -> Result<&mut TcpStream, TransportError> {
        if peer >= self.size {
            return Err(TransportError::InvalidRank {
                rank: peer,
                size: self.size,
            });
        }
        if peer == self.rank {
            return Err(TransportError::SelfMessage(peer));
        }
        let from = self.rank;
        self.channels[peer]
            .as_mut()
            .ok_or(TransportError::NoChannel { from, to: peer })
    }
}

/// Name of the host this participant runs on
pub fn processor_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
