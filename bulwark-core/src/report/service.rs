use std::fmt;

use bulwark_model::{EventObject, PluginFinding, ReportEvent};
use tokio::sync::mpsc;

use crate::error::{Result, ScanError};

/// Producer end of the session's event stream. Cheap to clone; every plugin
/// invocation receives an [`EventSink`] minted from it.
#[derive(Clone)]
pub struct ReportService {
    sender: mpsc::Sender<ReportEvent>,
    capacity: usize,
}

impl fmt::Debug for ReportService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportService")
            .field("capacity", &self.capacity)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl ReportService {
    /// Creates the producer and the single stream that consumes it.
    pub fn channel(capacity: usize) -> (Self, ReportStream) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender, capacity }, ReportStream { receiver })
    }

    pub fn sink(
        &self,
        plugin: impl Into<String>,
        command: impl Into<String>,
        object: EventObject,
    ) -> EventSink {
        EventSink {
            plugin: plugin.into(),
            command: command.into(),
            object,
            sender: self.sender.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consumer end of the session's event stream, owned by the event bridge.
pub struct ReportStream {
    receiver: mpsc::Receiver<ReportEvent>,
}

impl fmt::Debug for ReportStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportStream")
            .field("buffered", &self.receiver.len())
            .finish()
    }
}

impl ReportStream {
    pub async fn recv(&mut self) -> Option<ReportEvent> {
        self.receiver.recv().await
    }

    /// Refuses further sends; already buffered events stay readable.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Per-invocation event sink. Stamps plugin, command and target onto every
/// finding before handing it to the producer stream. Sends are awaited in
/// order, so one invocation's events keep their emission order.
#[derive(Clone)]
pub struct EventSink {
    plugin: String,
    command: String,
    object: EventObject,
    sender: mpsc::Sender<ReportEvent>,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("plugin", &self.plugin)
            .field("command", &self.command)
            .field("object", &self.object)
            .finish()
    }
}

impl EventSink {
    pub async fn emit(&self, finding: PluginFinding) -> Result<()> {
        let event = ReportEvent::from_finding(
            self.plugin.clone(),
            self.command.clone(),
            self.object.clone(),
            finding,
        );
        self.sender
            .send(event)
            .await
            .map_err(|_| ScanError::SessionClosed)
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_model::Severity;
    use serde_json::json;

    fn object() -> EventObject {
        EventObject {
            id: "sha256:1".into(),
            reference: "alpine:3.20".into(),
        }
    }

    #[tokio::test]
    async fn sink_stamps_provenance_in_emission_order() {
        let (service, mut stream) = ReportService::channel(8);
        let sink = service.sink("webshell", "scan/image", object());

        for idx in 0..3 {
            sink.emit(PluginFinding::new(Severity::High, "webshell", json!({ "idx": idx })))
                .await
                .unwrap();
        }

        for idx in 0..3 {
            let event = stream.recv().await.unwrap();
            assert_eq!(event.plugin, "webshell");
            assert_eq!(event.command, "scan/image");
            assert_eq!(event.object.id, "sha256:1");
            assert_eq!(event.detail["idx"], idx);
        }
    }

    #[tokio::test]
    async fn closed_stream_rejects_emits() {
        let (service, mut stream) = ReportService::channel(8);
        let sink = service.sink("p", "scan/image", object());
        stream.close();

        let err = sink
            .emit(PluginFinding::new(Severity::Low, "x", json!(null)))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::SessionClosed));
        assert!(service.is_closed());
    }
}
