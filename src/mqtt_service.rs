use crate::models::{qos_level, ConnectionTarget, InboundMessage, SubscriptionRequest};
use crate::render::render_message;
use crate::service_utils::timestamp;
use crate::tls::{self, TlsError};
use rumqttc::{
    AsyncClient, ConnAck, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    Outgoing, Packet,
};
use std::future::Future;
use std::io::Write;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

/// How long the DISCONNECT packet gets to leave before we give up on it.
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest packet the MQTT remaining-length field can describe.
pub const MQTT_MAX_PACKET_SIZE: usize = 268_435_455;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Connection(#[from] ConnectionError),
    #[error("broker refused connection (rc={0})")]
    Refused(u8),
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection tuning. Defaults: 60s keep-alive, reconnect backoff between
/// 1s and 60s, no packet size limit below the protocol maximum.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub keep_alive: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub channel_capacity: usize,
    pub max_packet_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(60),
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            channel_capacity: 10,
            max_packet_size: MQTT_MAX_PACKET_SIZE,
        }
    }
}

/// Doubling delay, clamped to `[min, max]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            current: min,
        }
    }

    /// Delay to wait now; the following call returns twice as much.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Owns the broker session: the client handle, its event loop and the fixed
/// subscription list that is replayed after every CONNACK.
pub struct MqttService<W: Write> {
    client: AsyncClient,
    eventloop: EventLoop,
    subscriptions: Vec<SubscriptionRequest>,
    client_state: ClientState,
    backoff: Backoff,
    has_connected: bool,
    console: W,
}

impl<W: Write> MqttService<W> {
    pub fn new(
        client_id: &str,
        target: &ConnectionTarget,
        credentials: Option<(String, String)>,
        subscriptions: Vec<SubscriptionRequest>,
        settings: &SessionSettings,
        console: W,
    ) -> Result<Self, SessionError> {
        debug!("Configuring MQTT broker at {}:{}...", target.host, target.port);

        let mut mqtt_options = MqttOptions::new(client_id, target.host.as_str(), target.port);
        mqtt_options.set_keep_alive(settings.keep_alive);
        mqtt_options.set_clean_session(true);
        mqtt_options.set_max_packet_size(settings.max_packet_size, settings.max_packet_size);
        mqtt_options.set_transport(tls::transport(target.use_encryption)?);

        if let Some((username, password)) = credentials {
            mqtt_options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, settings.channel_capacity);

        Ok(Self {
            client,
            eventloop,
            subscriptions,
            client_state: ClientState::Disconnected,
            backoff: Backoff::new(settings.min_backoff, settings.max_backoff),
            has_connected: false,
            console,
        })
    }

    pub fn client_state(&self) -> ClientState {
        self.client_state
    }

    /// Drive the session until `shutdown` resolves. Only a failure of the
    /// very first connection attempt ends the loop with an error.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting MQTT session...");
        tokio::pin!(shutdown);
        self.client_state = ClientState::Connecting;

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                event = self.eventloop.poll() => event,
            };

            if let Some(delay) = self.handle_event(event)? {
                warn!("Lost connection to MQTT broker. Retrying in {:?}...", delay);
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = sleep(delay) => {}
                }
                self.client_state = ClientState::Connecting;
            }
        }

        self.disconnect().await;
        Ok(())
    }

    /// React to one event-loop result. Returns the delay to sleep before the
    /// next connection attempt when the connection went away.
    fn handle_event(
        &mut self,
        event: Result<Event, ConnectionError>,
    ) -> Result<Option<Duration>, SessionError> {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(ConnAck { code, .. }))) => {
                if code == ConnectReturnCode::Success {
                    self.on_connected();
                    Ok(None)
                } else {
                    self.on_refused(code)
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                self.on_message(InboundMessage::from(publish));
                Ok(None)
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                debug!("Subscription acknowledged: {:?}", ack.return_codes);
                Ok(None)
            }
            Ok(event) => {
                debug!("Unhandled event: {:?}", event);
                Ok(None)
            }
            Err(ConnectionError::ConnectionRefused(code)) => self.on_refused(code),
            Err(e) => {
                self.client_state = ClientState::Disconnected;
                if !self.has_connected {
                    return Err(SessionError::Connection(e));
                }
                error!("Error in MQTT event loop: {}", e);
                self.console_line(&format!("Connection lost: {}", e));
                Ok(Some(self.backoff.next_delay()))
            }
        }
    }

    fn on_connected(&mut self) {
        info!("Connected to MQTT broker.");
        self.client_state = ClientState::Connected;
        self.has_connected = true;
        self.backoff.reset();
        self.console_line("Connected to broker");
        self.resubscribe();
    }

    fn on_refused(&mut self, code: ConnectReturnCode) -> Result<Option<Duration>, SessionError> {
        let rc = code as u8;
        self.client_state = ClientState::Disconnected;
        self.console_line(&format!("Connect failed with rc={}", rc));
        if !self.has_connected {
            return Err(SessionError::Refused(rc));
        }
        Ok(Some(self.backoff.next_delay()))
    }

    /// Clean sessions drop broker-side subscriptions, so every CONNACK gets
    /// the whole list again, in order.
    fn resubscribe(&mut self) {
        for request in &self.subscriptions {
            match self
                .client
                .try_subscribe(request.topic_pattern.as_str(), request.qos)
            {
                Ok(()) => {
                    let line = format!(
                        "Subscribed to {} (QoS {})",
                        request.topic_pattern,
                        qos_level(request.qos)
                    );
                    write_console_line(&mut self.console, &line);
                }
                Err(e) => {
                    error!("Failed to subscribe to topic '{}': {}", request.topic_pattern, e);
                }
            }
        }
    }

    fn on_message(&mut self, message: InboundMessage) {
        let ts = timestamp();
        if let Err(e) = render_message(&mut self.console, &ts, &message) {
            error!("Failed to render message on '{}': {}", message.topic, e);
            let _ = writeln!(self.console, "[{}] Error printing message: {}", ts, e);
        }
    }

    fn console_line(&mut self, text: &str) {
        write_console_line(&mut self.console, text);
    }

    /// Best effort: queue a DISCONNECT and give the event loop a moment to
    /// send it. Errors are ignored.
    async fn disconnect(&mut self) {
        let _ = writeln!(self.console, "\nDisconnecting...");
        let _ = self.console.flush();

        if self.client_state == ClientState::Connected {
            if let Err(e) = self.client.try_disconnect() {
                debug!("Disconnect request not queued: {}", e);
            }
            let eventloop = &mut self.eventloop;
            let flushed = timeout(DISCONNECT_FLUSH_TIMEOUT, async move {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            })
            .await;
            if flushed.is_err() {
                debug!("Timed out waiting for DISCONNECT to be sent");
            }
        }

        self.client_state = ClientState::Disconnected;
        info!("MQTT session closed.");
    }
}

fn write_console_line<W: Write>(console: &mut W, text: &str) {
    if let Err(e) = writeln!(console, "[{}] {}", timestamp(), text).and_then(|_| console.flush()) {
        error!("Console write failed: {}", e);
    }
}
