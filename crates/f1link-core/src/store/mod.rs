// ── Telemetry store ──
//
// Copy-on-write snapshot publication with push-based change notification.

mod state;

pub use state::TelemetryState;
