use cr_domain::error::Error;

/// Map a [`reqwest::Error`] onto the domain error, attributing transport
/// failures to `provider`.
pub(crate) fn from_reqwest(provider: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::transport(provider, e.to_string())
    }
}
