//! Linking build credentials to the service account that runs a plan

use tracing::debug;

use crate::domain::build::BuildTemplate;
use crate::domain::run::RunRequest;
use crate::domain::service_account::{SecretReference, ServiceAccount};

/// Adds every secret referenced by the build to the service account
///
/// Covers the source credentials, the builder image credentials and the
/// output credentials. When the run overrides the output with its own
/// credentials those are used instead of the template's. Secrets already
/// linked are left alone and nothing is ever removed.
///
/// Returns true when the service account was modified.
pub fn apply_credentials(
    build: &BuildTemplate,
    run: &RunRequest,
    service_account: &mut ServiceAccount,
) -> bool {
    let spec = &build.spec;

    let output_credentials = match run.spec.output.as_ref().and_then(|o| o.credentials.as_ref()) {
        Some(secret) => Some(secret),
        None => spec.output.credentials.as_ref(),
    };

    let secrets = [
        spec.source.credentials.as_ref(),
        spec.builder.as_ref().and_then(|b| b.credentials.as_ref()),
        output_credentials,
    ];

    let mut modified = false;
    for secret in secrets.into_iter().flatten() {
        modified |= link_secret(service_account, secret);
    }
    modified
}

fn link_secret(service_account: &mut ServiceAccount, secret: &str) -> bool {
    if service_account.has_secret(secret) {
        return false;
    }

    debug!(
        secret = %secret,
        service_account = %service_account.metadata.name,
        "Adding secret to service account"
    );
    service_account.secrets.push(SecretReference {
        name: secret.to_string(),
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::build::{BuildTemplateSpec, Image, Source, StrategyRef};
    use crate::domain::meta::ObjectMeta;
    use crate::domain::run::RunRequestSpec;

    fn build(source: Option<&str>, builder: Option<&str>, output: Option<&str>) -> BuildTemplate {
        BuildTemplate {
            metadata: ObjectMeta::namespaced("ns", "b1"),
            spec: BuildTemplateSpec {
                source: Source {
                    url: "https://github.com/example/app".to_string(),
                    revision: None,
                    context_dir: None,
                    credentials: source.map(str::to_string),
                },
                strategy: StrategyRef {
                    name: "kaniko".to_string(),
                    kind: Default::default(),
                },
                builder: builder.map(|secret| Image {
                    image: "gcr.io/kaniko".to_string(),
                    credentials: Some(secret.to_string()),
                }),
                dockerfile: None,
                output: Image {
                    image: "registry.example/app".to_string(),
                    credentials: output.map(str::to_string),
                },
                resources: None,
                timeout_seconds: None,
                retention: None,
            },
        }
    }

    fn run(output_secret: Option<&str>) -> RunRequest {
        RunRequest {
            metadata: ObjectMeta::namespaced("ns", "r1"),
            spec: RunRequestSpec {
                build_ref: "b1".to_string(),
                output: output_secret.map(|secret| Image {
                    image: "registry.example/other".to_string(),
                    credentials: Some(secret.to_string()),
                }),
                ..Default::default()
            },
            status: Default::default(),
        }
    }

    fn secret_names(sa: &ServiceAccount) -> Vec<&str> {
        sa.secrets.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_links_all_referenced_secrets() {
        let mut sa = ServiceAccount::new("ns", "pipeline");
        let modified = apply_credentials(
            &build(Some("git-creds"), Some("builder-creds"), Some("push-creds")),
            &run(None),
            &mut sa,
        );

        assert!(modified);
        assert_eq!(
            secret_names(&sa),
            vec!["git-creds", "builder-creds", "push-creds"]
        );
    }

    #[test]
    fn test_already_linked_is_unmodified() {
        let mut sa = ServiceAccount::new("ns", "pipeline");
        sa.secrets.push(SecretReference {
            name: "push-creds".to_string(),
        });

        let modified = apply_credentials(&build(None, None, Some("push-creds")), &run(None), &mut sa);
        assert!(!modified);
        assert_eq!(sa.secrets.len(), 1);
    }

    #[test]
    fn test_never_removes() {
        let mut sa = ServiceAccount::new("ns", "pipeline");
        sa.secrets.push(SecretReference {
            name: "unrelated".to_string(),
        });

        apply_credentials(&build(Some("git-creds"), None, None), &run(None), &mut sa);
        assert_eq!(secret_names(&sa), vec!["unrelated", "git-creds"]);
    }

    #[test]
    fn test_run_output_credentials_replace_template_output() {
        let mut sa = ServiceAccount::new("ns", "pipeline");
        apply_credentials(
            &build(None, None, Some("push-creds")),
            &run(Some("run-push-creds")),
            &mut sa,
        );
        assert_eq!(secret_names(&sa), vec!["run-push-creds"]);
    }

    #[test]
    fn test_no_credentials() {
        let mut sa = ServiceAccount::new("ns", "pipeline");
        assert!(!apply_credentials(&build(None, None, None), &run(None), &mut sa));
        assert!(sa.secrets.is_empty());
    }
}
