//! Mock Kafka broker for wire-level tests of the native admin client.
//!
//! Accepts connections, records every request frame and answers with a
//! response registered per API key. Responses are built with the
//! `kafka-protocol` codec through the helpers in [`responses`].

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use kafka_protocol::messages::RequestHeader;
use kafka_protocol::protocol::{Decodable, Request};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};

/// API keys the admin client sends.
pub mod api_keys {
    pub const METADATA: i16 = 3;
    pub const SASL_HANDSHAKE: i16 = 17;
    pub const API_VERSIONS: i16 = 18;
    pub const CREATE_TOPICS: i16 = 19;
    pub const DELETE_TOPICS: i16 = 20;
    pub const DESCRIBE_ACLS: i16 = 29;
    pub const CREATE_ACLS: i16 = 30;
    pub const DELETE_ACLS: i16 = 31;
    pub const CREATE_PARTITIONS: i16 = 37;
    pub const SASL_AUTHENTICATE: i16 = 36;
}

/// A recorded request.
#[derive(Debug, Clone)]
pub struct BrokerCall {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    /// Header and body, without the length prefix.
    pub request_bytes: Bytes,
}

impl BrokerCall {
    /// Decode the request body as `R`.
    pub fn decode<R: Request + Decodable>(&self) -> Option<R> {
        let mut buf = self.request_bytes.clone();
        RequestHeader::decode(&mut buf, R::header_version(self.api_version)).ok()?;
        R::decode(&mut buf, self.api_version).ok()
    }
}

/// Builds the response frame body for a call.
pub type ResponseGenerator = Arc<dyn Fn(&BrokerCall) -> Bytes + Send + Sync>;

pub struct MockBroker {
    address: String,
    shutdown_tx: Option<broadcast::Sender<()>>,
    call_log: Arc<RwLock<Vec<BrokerCall>>>,
    response_handlers: Arc<RwLock<HashMap<i16, ResponseGenerator>>>,
}

impl MockBroker {
    /// Broker that will bind to `address`; use port 0 for an ephemeral port.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            shutdown_tx: None,
            call_log: Arc::new(RwLock::new(Vec::new())),
            response_handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start accepting connections.
    ///
    /// Returns the address actually bound.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn start(&mut self) -> std::io::Result<String> {
        let listener = TcpListener::bind(&self.address).await?;
        let actual_address = listener.local_addr()?.to_string();
        self.address = actual_address.clone();

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx.clone());

        let call_log = Arc::clone(&self.call_log);
        let response_handlers = Arc::clone(&self.response_handlers);
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let call_log = Arc::clone(&call_log);
                        let response_handlers = Arc::clone(&response_handlers);
                        let shutdown_rx = shutdown_tx.subscribe();
                        tokio::spawn(async move {
                            Self::handle_connection(stream, call_log, response_handlers, shutdown_rx).await;
                        });
                    }
                }
            }
        });

        Ok(actual_address)
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    pub async fn register_handler(&self, api_key: i16, handler: ResponseGenerator) {
        self.response_handlers.write().await.insert(api_key, handler);
    }

    pub async fn get_calls(&self) -> Vec<BrokerCall> {
        self.call_log.read().await.clone()
    }

    pub async fn get_calls_for_api(&self, api_key: i16) -> Vec<BrokerCall> {
        self.call_log
            .read()
            .await
            .iter()
            .filter(|c| c.api_key == api_key)
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.call_log.write().await.clear();
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn handle_connection(
        mut stream: TcpStream,
        call_log: Arc<RwLock<Vec<BrokerCall>>>,
        response_handlers: Arc<RwLock<HashMap<i16, ResponseGenerator>>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = Self::read_frame(&mut stream) => {
                    let Ok(Some(frame)) = result else { break };
                    if frame.len() < 8 {
                        continue;
                    }

                    let call = BrokerCall {
                        api_key: i16::from_be_bytes([frame[0], frame[1]]),
                        api_version: i16::from_be_bytes([frame[2], frame[3]]),
                        correlation_id: i32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]),
                        request_bytes: Bytes::from(frame),
                    };
                    call_log.write().await.push(call.clone());

                    let handler = response_handlers.read().await.get(&call.api_key).cloned();
                    let Some(handler) = handler else {
                        // No handler: leave the request unanswered so the
                        // client observes a timeout.
                        continue;
                    };
                    if Self::write_frame(&mut stream, &handler(&call)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;
        Ok(Some(buf))
    }

    async fn write_frame(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
        let mut buf = BytesMut::with_capacity(4 + data.len());
        buf.put_u32(data.len() as u32);
        buf.extend_from_slice(data);
        stream.write_all(&buf).await?;
        stream.flush().await
    }
}

/// Response builders.
pub mod responses {
    use std::sync::Arc;

    use bytes::{Bytes, BytesMut};
    use kafka_protocol::messages::metadata_response::{
        MetadataResponseBroker, MetadataResponsePartition, MetadataResponseTopic,
    };
    use kafka_protocol::messages::{BrokerId, MetadataResponse, ResponseHeader, TopicName};
    use kafka_protocol::protocol::{Encodable, HeaderVersion, StrBytes};

    use super::{BrokerCall, ResponseGenerator};

    /// Encode `body` as the answer to `call`, header included.
    pub fn encode<M: Encodable + HeaderVersion>(call: &BrokerCall, body: &M) -> Bytes {
        let mut buf = BytesMut::new();
        ResponseHeader::default()
            .with_correlation_id(call.correlation_id)
            .encode(&mut buf, M::header_version(call.api_version))
            .expect("response header encodes");
        body.encode(&mut buf, call.api_version)
            .expect("response body encodes");
        buf.freeze()
    }

    /// Answer every call with the same body.
    pub fn fixed<M>(body: M) -> ResponseGenerator
    where
        M: Encodable + HeaderVersion + Send + Sync + 'static,
    {
        Arc::new(move |call| encode(call, &body))
    }

    /// One broker, which is also the controller, hosting `topics` as
    /// `(name, partitions, replicas)`. Replica ids are 0..replicas.
    pub fn metadata(address: &str, topics: &[(&str, i32, i32)]) -> MetadataResponse {
        let (host, port) = address.rsplit_once(':').unwrap_or((address, "9092"));
        let port: i32 = port.parse().unwrap_or(9092);

        MetadataResponse::default()
            .with_brokers(vec![MetadataResponseBroker::default()
                .with_node_id(BrokerId(0))
                .with_host(StrBytes::from_string(host.to_string()))
                .with_port(port)])
            .with_controller_id(BrokerId(0))
            .with_topics(
                topics
                    .iter()
                    .map(|(name, partitions, replicas)| {
                        MetadataResponseTopic::default()
                            .with_name(Some(TopicName::from(StrBytes::from_string(name.to_string()))))
                            .with_is_internal(name.starts_with("__"))
                            .with_partitions(
                                (0..*partitions)
                                    .map(|i| {
                                        MetadataResponsePartition::default()
                                            .with_partition_index(i)
                                            .with_leader_id(BrokerId(0))
                                            .with_replica_nodes((0..*replicas).map(BrokerId).collect())
                                    })
                                    .collect(),
                            )
                    })
                    .collect(),
            )
    }
}
