use thiserror::Error;

/// Failures raised while retrieving attachments from the mailbox store.
/// All of these surface to the caller as an empty classification with a
/// non-empty error string; none of them are retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("attachment service reported failure: {0}")]
    ServiceFailure(String),
    #[error("attachment service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid mailbox endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("malformed service response: {0}")]
    Response(#[from] quick_xml::Error),
    #[error("undecodable attachment content: {0}")]
    Content(#[from] base64::DecodeError),
}

/// Failures raised while parsing attachment content. These are recovered
/// per attachment: the attachment contributes no classification and the
/// batch continues.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("not a document package: {0}")]
    NotAPackage(#[from] zip::result::ZipError),
    #[error("malformed properties xml: {0}")]
    MalformedXml(#[from] quick_xml::Error),
    #[error("unreadable package entry: {0}")]
    Entry(#[from] std::io::Error),
}
