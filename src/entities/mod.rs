pub mod prelude;

pub mod analyses;
pub mod calls;
pub mod dependents;
pub mod pairing_codes;
pub mod users;
pub mod voice_sessions;
