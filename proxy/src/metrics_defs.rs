use shared::metrics_defs::{MetricDef, MetricType};

pub const DECISIONS: MetricDef = MetricDef {
    name: "render.decision",
    metric_type: MetricType::Counter,
    description: "Requests seen by the render filter. Tagged with decision (escaped_fragment, bot, pass_through).",
};

pub const RENDER_DURATION: MetricDef = MetricDef {
    name: "render.duration",
    metric_type: MetricType::Histogram,
    description: "Time until the render service answered with headers, in seconds.",
};

pub const RENDER_BYTES: MetricDef = MetricDef {
    name: "render.bytes",
    metric_type: MetricType::Histogram,
    description: "Bytes relayed from the render service per request. Tagged with outcome.",
};

pub const RENDER_ERRORS: MetricDef = MetricDef {
    name: "render.errors",
    metric_type: MetricType::Counter,
    description: "Failed gateway requests. Tagged with kind.",
};

pub const ALL_METRICS: &[MetricDef] = &[DECISIONS, RENDER_DURATION, RENDER_BYTES, RENDER_ERRORS];
