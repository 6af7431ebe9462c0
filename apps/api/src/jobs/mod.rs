// Job profiles (headline, experience, education, skills) and the public talent search.

pub mod completeness;
pub mod handlers;
