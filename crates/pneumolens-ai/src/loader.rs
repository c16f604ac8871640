//! Startup model loading as an ordered list of strategies.
//!
//! Each strategy either produces a ready model or explains why it could not;
//! the first success wins and exhaustion leaves the classifier permanently
//! unavailable for the process.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cnn::{CnnSpec, Forward, PneumoniaCnn};
use crate::predictor::{ModelState, Predictor};
use crate::weights::ParameterFile;

/// One way of turning a file on disk into a runnable model.
pub trait ModelLoader: Send + Sync {
    fn name(&self) -> &'static str;

    fn load(&self, path: &Path, spec: &CnnSpec) -> anyhow::Result<Box<dyn Forward>>;
}

/// Bind a safetensors parameter file into the native network.
pub struct StateDictLoader;

impl ModelLoader for StateDictLoader {
    fn name(&self) -> &'static str {
        "state-dict"
    }

    fn load(&self, path: &Path, spec: &CnnSpec) -> anyhow::Result<Box<dyn Forward>> {
        let params = ParameterFile::read(path)?;
        let model = PneumoniaCnn::load(spec.clone(), params)?;
        Ok(Box::new(model))
    }
}

/// Strategies in preference order: parameters first, then a full serialized graph.
pub fn default_loaders() -> Vec<Box<dyn ModelLoader>> {
    #[allow(unused_mut)]
    let mut loaders: Vec<Box<dyn ModelLoader>> = vec![Box::new(StateDictLoader)];
    #[cfg(feature = "onnx")]
    loaders.push(Box::new(crate::onnx::OnnxGraphLoader));
    loaders
}

/// Try each loader in turn against `path`.
pub fn load_model(path: &Path, spec: &CnnSpec, loaders: &[Box<dyn ModelLoader>]) -> ModelState {
    if let Err(e) = spec.validate() {
        warn!(error = %e, "invalid model architecture");
        return ModelState::Unavailable {
            reason: e.to_string(),
        };
    }

    let mut failures = Vec::with_capacity(loaders.len());
    for loader in loaders {
        match loader.load(path, spec) {
            Ok(model) => {
                info!(
                    strategy = loader.name(),
                    backend = model.backend(),
                    path = %path.display(),
                    "loaded classifier model"
                );
                return ModelState::Ready(Arc::new(Predictor::new(model, spec.clone())));
            }
            Err(e) => {
                warn!(strategy = loader.name(), path = %path.display(), error = %e, "model load failed");
                failures.push(format!("{}: {e}", loader.name()));
            }
        }
    }

    let reason = if failures.is_empty() {
        "no model loaders configured".to_string()
    } else {
        failures.join("; ")
    };
    warn!(reason = %reason, "classifier disabled for this process");
    ModelState::Unavailable { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnn::tests::constant_parameters;
    use crate::weights::tests::oversized_header;
    use crate::error::PipelineError;
    use ndarray::{Array2, ArrayView4};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing(&'static str);

    impl ModelLoader for Failing {
        fn name(&self) -> &'static str {
            self.0
        }

        fn load(&self, _: &Path, _: &CnnSpec) -> anyhow::Result<Box<dyn Forward>> {
            anyhow::bail!("{} cannot read this", self.0)
        }
    }

    struct Constant;

    impl Forward for Constant {
        fn forward(&self, input: ArrayView4<'_, f32>) -> Result<Array2<f32>, PipelineError> {
            Ok(Array2::from_elem((input.dim().0, 1), 2.0))
        }

        fn backend(&self) -> &'static str {
            "constant"
        }
    }

    struct Counting(Arc<AtomicUsize>);

    impl ModelLoader for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn load(&self, _: &Path, _: &CnnSpec) -> anyhow::Result<Box<dyn Forward>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Constant))
        }
    }

    #[test]
    fn state_dict_file_loads() {
        let spec = CnnSpec::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        std::fs::write(&path, constant_parameters(&spec, 1.0)).unwrap();

        let state = load_model(&path, &spec, &default_loaders());
        let predictor = state.predictor().unwrap();
        assert_eq!(predictor.backend(), "native");
    }

    #[test]
    fn missing_file_leaves_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let state = load_model(
            &dir.path().join("absent.pth"),
            &CnnSpec::default(),
            &default_loaders(),
        );
        match state {
            ModelState::Unavailable { reason } => assert!(reason.contains("state-dict")),
            ModelState::Ready(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn oversized_header_leaves_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crafted.safetensors");
        std::fs::write(&path, oversized_header()).unwrap();

        let state = load_model(&path, &CnnSpec::default(), &default_loaders());
        match state {
            ModelState::Unavailable { reason } => {
                assert!(reason.contains("state-dict: malformed parameter file"))
            }
            ModelState::Ready(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn truncated_file_leaves_model_unavailable() {
        let spec = CnnSpec::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let bytes = constant_parameters(&spec, 1.0);
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(!load_model(&path, &spec, &default_loaders()).is_ready());
    }

    #[test]
    fn fallback_used_after_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loaders: Vec<Box<dyn ModelLoader>> = vec![
            Box::new(Failing("first")),
            Box::new(Counting(calls.clone())),
            Box::new(Counting(calls.clone())),
        ];
        let state = load_model(Path::new("ignored"), &CnnSpec::default(), &loaders);
        assert!(state.is_ready());
        // first success wins; later strategies are never tried
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhaustion_collects_every_failure() {
        let loaders: Vec<Box<dyn ModelLoader>> =
            vec![Box::new(Failing("one")), Box::new(Failing("two"))];
        match load_model(Path::new("x"), &CnnSpec::default(), &loaders) {
            ModelState::Unavailable { reason } => {
                assert!(reason.contains("one: one cannot read this"));
                assert!(reason.contains("two: two cannot read this"));
            }
            ModelState::Ready(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn invalid_architecture_never_loads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loaders: Vec<Box<dyn ModelLoader>> = vec![Box::new(Counting(calls.clone()))];
        let spec = CnnSpec {
            input_size: 50,
            ..CnnSpec::default()
        };
        assert!(!load_model(Path::new("x"), &spec, &loaders).is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn no_loaders_is_unavailable() {
        let state = load_model(Path::new("x"), &CnnSpec::default(), &[]);
        assert!(!state.is_ready());
    }
}
