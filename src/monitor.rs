//! Backend connection state and the latched trouble banner.

/// Observed transport health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        }
    }
}

/// Tracks connection transitions and whether the trouble banner shows.
///
/// The banner latches on when the connection drops or errors and stays up
/// until a reconnect or an explicit dismissal. It starts hidden even though
/// the initial status is `Disconnected`; only an observed drop raises it.
#[derive(Debug, Default)]
pub struct ConnectionMonitor {
    status: ConnectionStatus,
    banner_visible: bool,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn banner_visible(&self) -> bool {
        self.banner_visible
    }

    /// Returns true when the status actually changed.
    pub fn on_connected(&mut self) -> bool {
        let changed = self.status != ConnectionStatus::Connected;
        self.status = ConnectionStatus::Connected;
        self.banner_visible = false;
        changed
    }

    pub fn on_disconnected(&mut self) -> bool {
        let changed = self.status != ConnectionStatus::Disconnected;
        self.status = ConnectionStatus::Disconnected;
        self.banner_visible = true;
        changed
    }

    pub fn on_connect_error(&mut self) -> bool {
        let changed = self.status != ConnectionStatus::Error;
        self.status = ConnectionStatus::Error;
        self.banner_visible = true;
        changed
    }

    /// Manual dismissal; the status itself is untouched.
    pub fn dismiss_banner(&mut self) {
        self.banner_visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected_without_banner() {
        let monitor = ConnectionMonitor::new();
        assert_eq!(monitor.status(), ConnectionStatus::Disconnected);
        assert!(!monitor.banner_visible());
    }

    #[test]
    fn drop_raises_banner_and_reconnect_clears_it() {
        let mut monitor = ConnectionMonitor::new();
        assert!(monitor.on_connected());
        assert!(!monitor.banner_visible());

        assert!(monitor.on_disconnected());
        assert_eq!(monitor.status(), ConnectionStatus::Disconnected);
        assert!(monitor.banner_visible());

        assert!(monitor.on_connected());
        assert_eq!(monitor.status(), ConnectionStatus::Connected);
        assert!(!monitor.banner_visible());
    }

    #[test]
    fn connect_error_latches_banner() {
        let mut monitor = ConnectionMonitor::new();
        assert!(monitor.on_connect_error());
        assert_eq!(monitor.status(), ConnectionStatus::Error);
        assert!(monitor.banner_visible());

        // repeat reports keep the banner up without a status change
        assert!(!monitor.on_connect_error());
        assert!(monitor.banner_visible());
    }

    #[test]
    fn dismissal_hides_banner_but_keeps_status() {
        let mut monitor = ConnectionMonitor::new();
        monitor.on_connected();
        monitor.on_disconnected();
        monitor.dismiss_banner();
        assert!(!monitor.banner_visible());
        assert_eq!(monitor.status(), ConnectionStatus::Disconnected);

        // a fresh drop raises it again
        monitor.on_connected();
        monitor.on_disconnected();
        assert!(monitor.banner_visible());
    }
}
