#[macro_use]
extern crate serde_derive;
#[macro_use(Message, MessageResponse)]
extern crate actix_derive;
extern crate colored;

pub mod channel;
pub mod client;
pub mod mailbox;
pub mod message;
pub mod peers;
pub mod round;
pub mod server;
pub mod telemetry;
pub mod transport;
pub mod vvc;

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    Bincode(bincode::Error),
    Config(config::ConfigError),
    Actix(actix::MailboxError),

    // channel errors
    /// A peer delivery did not complete within the request timeout.
    Timeout,

    // scheduler errors
    /// A scheduler fault other than cancellation; fatal for the round controller.
    Scheduler(String),

    // device errors
    Device(String),
    UnknownSignal(String),

    // settings errors
    InvalidSettings(String),
}

impl std::error::Error for Error {}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

impl std::convert::From<bincode::Error> for Error {
    fn from(error: bincode::Error) -> Self {
        Error::Bincode(error)
    }
}

impl std::convert::From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Error::Config(error)
    }
}

impl std::convert::From<actix::MailboxError> for Error {
    fn from(error: actix::MailboxError) -> Self {
        Error::Actix(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
