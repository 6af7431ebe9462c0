// Database row types. One file per aggregate; each struct maps a table 1:1.

pub mod appointment;
pub mod card;
pub mod job_profile;
pub mod lead;
pub mod segment;
pub mod user;
