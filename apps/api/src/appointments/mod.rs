// Appointment booking: host calendar, weekly availability, public slot booking.
// Conflict detection is a half-open interval test over pending/confirmed bookings.

pub mod availability;
pub mod conflicts;
pub mod handlers;
pub mod models;
