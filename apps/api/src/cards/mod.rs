// Digital business cards: owner CRUD, public view by slug, public contact form.

pub mod handlers;
pub mod slug;
