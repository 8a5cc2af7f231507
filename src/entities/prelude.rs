pub use super::analyses::Entity as Analyses;
pub use super::calls::Entity as Calls;
pub use super::dependents::Entity as Dependents;
pub use super::pairing_codes::Entity as PairingCodes;
pub use super::users::Entity as Users;
pub use super::voice_sessions::Entity as VoiceSessions;
