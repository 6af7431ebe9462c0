// Operator-only views across every tenant.

pub mod handlers;
