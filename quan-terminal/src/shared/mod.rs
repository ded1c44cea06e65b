/// Projection of feed payloads into display-ready views.
pub mod projector;

/// Bounded label/value series backing the charts.
pub mod series;

/// Wire types shared by the REST API and realtime feeds.
pub mod types;
