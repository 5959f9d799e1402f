use kube::config::KubeconfigError;

use super::object::ResourceKind;

const REASON_ALREADY_EXISTS: &str = "AlreadyExists";
const REASON_NOT_FOUND: &str = "NotFound";

#[derive(thiserror::Error, Debug)]
pub enum K8sError {
    #[error("the kube client returned an error: `{0}`")]
    Generic(#[from] kube::Error),

    #[error("it is not possible to read kubeconfig: `{0}`")]
    UnableToSetupClientKubeconfig(#[from] KubeconfigError),

    #[error("{kind} `{name}` has no namespace")]
    MissingNamespace { kind: ResourceKind, name: String },

    #[error("expected a {expected} object, got a {actual}")]
    UnexpectedKind {
        expected: ResourceKind,
        actual: ResourceKind,
    },
}

impl K8sError {
    /// Returns the reason reported by the api-server, if the error comes from an api response.
    pub fn api_reason(&self) -> Option<&str> {
        match self {
            K8sError::Generic(kube::Error::Api(response)) => Some(response.reason.as_str()),
            _ => None,
        }
    }

    /// Returns the HTTP status code reported by the api-server, if any.
    pub fn api_code(&self) -> Option<u16> {
        match self {
            K8sError::Generic(kube::Error::Api(response)) => Some(response.code),
            _ => None,
        }
    }

    /// True when the object being created is already present in the cluster.
    pub fn is_already_exists(&self) -> bool {
        self.api_reason() == Some(REASON_ALREADY_EXISTS)
    }

    pub fn is_not_found(&self) -> bool {
        self.api_reason() == Some(REASON_NOT_FOUND) || self.api_code() == Some(404)
    }
}
