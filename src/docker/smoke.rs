//! HTTP smoke tests against deployed workloads

use crate::config::TestCase;
use crate::error::{CloudockError, Result};
use crate::node::LiveNode;
use tracing::{debug, info, warn};

/// URL a test case targets on `node`
pub fn test_url(case: &TestCase, node: &LiveNode) -> String {
    let path = if case.path.starts_with('/') {
        case.path.clone()
    } else {
        format!("/{}", case.path)
    };
    format!("{}://{}:{}{}", case.protocol, node.ipv4, case.port, path)
}

/// Check a response body against the declared expectations
///
/// The body passes when it starts with `should_start_with`, or else when
/// it contains `should_contain`. A case declaring neither never passes.
pub fn evaluate(case: &TestCase, body: &str) -> Result<()> {
    if let Some(prefix) = &case.should_start_with {
        if body.starts_with(prefix.as_str()) {
            return Ok(());
        }
    }
    if let Some(fragment) = &case.should_contain {
        if body.contains(fragment.as_str()) {
            return Ok(());
        }
    }

    let expected = match (&case.should_start_with, &case.should_contain) {
        (None, None) => "no expectation declared".to_string(),
        (Some(prefix), None) => format!("body should start with {:?}", prefix),
        (None, Some(fragment)) => format!("body should contain {:?}", fragment),
        (Some(prefix), Some(fragment)) => format!(
            "body should start with {:?} or contain {:?}",
            prefix, fragment
        ),
    };
    Err(CloudockError::SmokeTest(format!("{}: {}", case.name, expected)))
}

/// Run one test case against one node
pub async fn run_case(client: &reqwest::Client, case: &TestCase, node: &LiveNode) -> Result<()> {
    let url = test_url(case, node);
    debug!("GET {}", url);

    let mut request = client.get(&url);
    if !case.query.is_empty() {
        request = request.query(&case.query);
    }
    if let Some(auth) = &case.auth {
        request = request.basic_auth(&auth.username, Some(&auth.password));
    }

    let body = request.send().await?.text().await?;

    match evaluate(case, &body) {
        Ok(()) => {
            info!("Test {} on {} successfully completed", case.name, node.name);
            Ok(())
        }
        Err(e) => {
            warn!("Test {} on {} in error", case.name, node.name);
            Err(e)
        }
    }
}
