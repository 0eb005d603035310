mod interpreter;
mod protocol;
mod response;

pub use interpreter::{ChangeInterpreter, Outcome};
pub use protocol::ProtocolNames;
pub use response::{Anchor, ChangeOperation, ResponseError, parse_response};
