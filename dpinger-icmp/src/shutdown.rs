use tokio::sync::broadcast;

/// listens for a shutdown signal broadcast from the owning `IcmpEngine`.
///
/// cloning the sender and dropping every clone is what actually fires the
/// signal, so this type only wraps the receiving half.
#[derive(Debug)]
pub struct Shutdown {
    is_shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            is_shutdown: false,
            notify,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    /// resolves once a shutdown has been signalled; resolves immediately on
    /// every call after the first
    pub async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }
        let _ = self.notify.recv().await;
        self.is_shutdown = true;
    }
}
