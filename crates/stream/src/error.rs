use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StreamError {
    #[snafu(display("query question is empty"))]
    EmptyQuestion { stage: &'static str },
    #[snafu(display("query endpoint base URL is empty"))]
    EmptyBaseUrl { stage: &'static str },
}

pub type StreamResult<T> = Result<T, StreamError>;
