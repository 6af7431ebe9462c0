// Contact/lead CRM: scoring, CRUD, bulk import.
// Filtering is shared with segments via `segments::criteria`.

pub mod handlers;
pub mod import;
pub mod models;
pub mod scoring;
pub mod store;
