#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Generic {0}")]
    Generic(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error [{status}]: {body}")]
    Api { status: u16, body: String },

    #[error("Fatal precondition: {0}")]
    FatalPrecondition(String),
}

impl Error {
    /// Turn an unexpected response into an [`Error::Api`], consuming the body.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Error::Api { status, body }
    }
}

impl From<qrops_core::ledger::LedgerError> for Error {
    fn from(err: qrops_core::ledger::LedgerError) -> Self {
        Error::Generic(err.to_string())
    }
}
