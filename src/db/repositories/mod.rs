pub mod analysis;
pub mod dependent;
pub mod pairing;
pub mod session;
pub mod user;
