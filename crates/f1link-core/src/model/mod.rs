// ── Telemetry domain model ──
//
// The decoded shape of everything the publisher sends below the root
// topic path.

pub mod telemetry;
pub mod topic;

// ── Re-exports ──────────────────────────────────────────────────────

pub use telemetry::{PublisherMetrics, TelemetrySnapshot, TelemetryValue};
pub use topic::{PublisherMetric, TelemetryTopic, UnknownTopic};
