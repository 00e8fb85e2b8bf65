use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("unable to open the {_0}")]
    Startup(#[error(not(source))] &'static str),
    #[display("{_0} failed")]
    Command(#[error(not(source))] &'static str),
    #[display("unable to write output")]
    Output,
}
