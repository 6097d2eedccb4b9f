// Alert system: rainfall crossings in, prioritized alerts out.
//
// Architecture:
// - model.rs: Alert, kind and priority types
// - messages.rs: Location-keyed fallback message catalog
// - generator.rs: Content generator seam and speech text derivation
// - engine.rs: Detection, cooldown gating, pending/history and subscribers

pub mod engine;
pub mod generator;
pub mod messages;
pub mod model;
