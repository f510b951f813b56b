use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const LIKES_TOTAL: &str = "pixerra_likes_total";
pub const VIEWS_TOTAL: &str = "pixerra_views_total";
pub const MESSAGES_TOTAL: &str = "pixerra_messages_total";
pub const UPLOADS_TOTAL: &str = "pixerra_uploads_total";
pub const NOTIFICATION_FAILURES_TOTAL: &str = "pixerra_notification_failures_total";

static HANDLE: OnceCell<Option<PrometheusHandle>> = OnceCell::new();

/// Installs the global Prometheus recorder once per process. Later calls (and tests
/// building several apps) reuse the first handle.
pub fn install() -> Option<&'static PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("metrics recorder not installed: {e}");
                None
            }
        })
        .as_ref()
}

/// Prometheus text exposition, empty when no recorder could be installed.
pub fn render() -> String {
    install().map(PrometheusHandle::render).unwrap_or_default()
}
