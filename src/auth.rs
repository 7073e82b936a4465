//! Manager-view gate around an external face-match collaborator.
//!
//! This is a demo affordance, not a security control: the collaborator is a
//! plug-in, there is no anti-spoofing and no lockout. What the gate does
//! guarantee is that every outcome other than a positive match, including a
//! hung or crashing collaborator, denies access with a readable reason.

use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::error::{DashboardError, Result};

/// What the collaborator concluded about a photo
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    Match,
    NoMatch,
    NoFaceDetected,
}

/// Face-match provider: image bytes in, verdict out
pub trait FaceMatcher: Send + Sync {
    /// `Err` means the provider itself is unavailable
    fn verify(&self, photo: &[u8]) -> std::result::Result<MatchOutcome, String>;

    fn name(&self) -> &str;
}

/// Provider used when none is configured; always unavailable
pub struct DisabledMatcher;

impl FaceMatcher for DisabledMatcher {
    fn verify(&self, _photo: &[u8]) -> std::result::Result<MatchOutcome, String> {
        Err("no face-match provider is configured".into())
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Provider that returns a fixed verdict, for demos and tests
pub struct StaticMatcher(pub MatchOutcome);

impl FaceMatcher for StaticMatcher {
    fn verify(&self, photo: &[u8]) -> std::result::Result<MatchOutcome, String> {
        if photo.is_empty() {
            return Ok(MatchOutcome::NoFaceDetected);
        }
        Ok(self.0)
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Provider that compares the photo with a registered reference image
///
/// Only byte-identical images match. Good enough for a kiosk demo where the
/// badge photo is uploaded as-is; a real deployment plugs in a proper matcher.
pub struct ReferenceImageMatcher {
    reference: Vec<u8>,
}

impl ReferenceImageMatcher {
    pub fn new(reference: Vec<u8>) -> Self {
        ReferenceImageMatcher { reference }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let reference = std::fs::read(path).map_err(|e| {
            DashboardError::Config(format!(
                "cannot read reference image {}: {}",
                path.display(),
                e
            ))
        })?;
        if reference.is_empty() {
            return Err(DashboardError::Config(format!(
                "reference image {} is empty",
                path.display()
            )));
        }
        Ok(ReferenceImageMatcher::new(reference))
    }
}

impl FaceMatcher for ReferenceImageMatcher {
    fn verify(&self, photo: &[u8]) -> std::result::Result<MatchOutcome, String> {
        if photo.is_empty() {
            return Ok(MatchOutcome::NoFaceDetected);
        }
        if photo == self.reference.as_slice() {
            Ok(MatchOutcome::Match)
        } else {
            Ok(MatchOutcome::NoMatch)
        }
    }

    fn name(&self) -> &str {
        "reference"
    }
}

/// Proof that the gate accepted a photo
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessGrant {
    pub provider: String,
}

pub struct ManagerGate {
    matcher: Arc<dyn FaceMatcher>,
    timeout: Duration,
}

impl ManagerGate {
    pub fn new(matcher: Arc<dyn FaceMatcher>, timeout: Duration) -> Self {
        ManagerGate { matcher, timeout }
    }

    pub fn disabled() -> Self {
        ManagerGate::new(Arc::new(DisabledMatcher), Duration::from_secs(1))
    }

    /// Runs the collaborator once, bounded by the gate timeout
    pub fn check(&self, photo: Vec<u8>) -> Result<AccessGrant> {
        let matcher = Arc::clone(&self.matcher);
        let provider = matcher.name().to_string();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let verdict = matcher.verify(&photo);
            // the receiver may have given up already
            let _ = tx.send(verdict);
        });

        let outcome = match rx.recv_timeout(self.timeout) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(reason)) => {
                warn!("face-match provider {} unavailable: {}", provider, reason);
                return Err(DashboardError::SourceUnavailable(reason));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("face-match provider {} timed out", provider);
                return Err(DashboardError::AuthenticationFailure(format!(
                    "verification timed out after {}s",
                    self.timeout.as_secs_f32()
                )));
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!("face-match provider {} stopped without a verdict", provider);
                return Err(DashboardError::SourceUnavailable(
                    "face-match provider stopped unexpectedly".into(),
                ));
            }
        };

        match outcome {
            MatchOutcome::Match => {
                info!("manager view unlocked via {}", provider);
                Ok(AccessGrant { provider })
            }
            MatchOutcome::NoMatch => Err(DashboardError::AuthenticationFailure(
                "the face does not match the registered manager".into(),
            )),
            MatchOutcome::NoFaceDetected => Err(DashboardError::AuthenticationFailure(
                "no face was detected in the photo".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowMatcher;

    impl FaceMatcher for SlowMatcher {
        fn verify(&self, _photo: &[u8]) -> std::result::Result<MatchOutcome, String> {
            thread::sleep(Duration::from_millis(500));
            Ok(MatchOutcome::Match)
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    struct PanickingMatcher;

    impl FaceMatcher for PanickingMatcher {
        fn verify(&self, _photo: &[u8]) -> std::result::Result<MatchOutcome, String> {
            panic!("camera driver crashed");
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    fn gate(matcher: impl FaceMatcher + 'static) -> ManagerGate {
        ManagerGate::new(Arc::new(matcher), Duration::from_millis(100))
    }

    #[test]
    fn match_grants_access() {
        let grant = gate(StaticMatcher(MatchOutcome::Match))
            .check(vec![1, 2, 3])
            .unwrap();
        assert_eq!(grant.provider, "static");
    }

    #[test]
    fn no_match_and_no_face_are_denied() {
        let err = gate(StaticMatcher(MatchOutcome::NoMatch))
            .check(vec![1])
            .unwrap_err();
        assert!(matches!(err, DashboardError::AuthenticationFailure(_)));

        let err = gate(StaticMatcher(MatchOutcome::Match))
            .check(Vec::new())
            .unwrap_err();
        assert!(err.user_message().contains("no face"));
    }

    #[test]
    fn reference_image_matches_only_itself() {
        let matcher = ReferenceImageMatcher::new(vec![7, 7, 7]);
        assert_eq!(matcher.verify(&[7, 7, 7]), Ok(MatchOutcome::Match));
        assert_eq!(matcher.verify(&[7, 7]), Ok(MatchOutcome::NoMatch));
        assert_eq!(matcher.verify(&[]), Ok(MatchOutcome::NoFaceDetected));
    }

    #[test]
    fn missing_reference_image_is_a_config_error() {
        let err = ReferenceImageMatcher::from_path(Path::new("/no/such/manager.png"))
            .err()
            .unwrap();
        assert!(matches!(err, DashboardError::Config(_)));
    }

    #[test]
    fn disabled_provider_is_unavailable() {
        let err = ManagerGate::disabled().check(vec![1]).unwrap_err();
        assert!(matches!(err, DashboardError::SourceUnavailable(_)));
        assert!(err.is_access_denied());
    }

    #[test]
    fn slow_provider_times_out() {
        let err = gate(SlowMatcher).check(vec![1]).unwrap_err();
        assert!(err.user_message().contains("timed out"));
    }

    #[test]
    fn crashing_provider_denies_instead_of_crashing() {
        let err = gate(PanickingMatcher).check(vec![1]).unwrap_err();
        assert!(err.is_access_denied());
    }
}
