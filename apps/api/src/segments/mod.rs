// Lead segments: saved JSON criteria (dynamic) or explicit member lists (static).

pub mod criteria;
pub mod handlers;
