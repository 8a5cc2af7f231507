pub mod aggregate;
pub mod analyzer;
pub mod pairing;
pub mod purge;
pub mod questions;
pub mod session;
pub mod token_issuer;

pub use aggregate::{FileScore, Pick, RiskLevel, Verdict};
pub use analyzer::{Analyzer, AnalyzerError, build_analyzer};
pub use pairing::{AcceptTarget, PairingError, PairingService};
pub use questions::{FsQuestionSource, QuestionSource};
pub use session::{AnswerUpload, SessionError, SessionService};
pub use token_issuer::{Principal, TokenError, TokenIssuer};
