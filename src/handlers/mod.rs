// Two handler tiers:
// public (no auth: service banner, health) and protected (bearer JWT, /api/*)
pub mod protected;
pub mod public;
