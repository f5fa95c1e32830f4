/// # ONNX Runtime Session
/// Loads the packaged eye classifier and runs forward passes with `ort`.
use super::execution_providers::{get_ep_info, is_initialized};
use super::{ModelLoader, ModelRuntime};
use crate::error::{InferenceError, ModelLoadError};
use crate::preprocess::ImageTensor;
use ort::{inputs, session::Session, value::Value};
use parking_lot::Mutex;
use smartsight_types::{async_trait, tokio};
use std::path::PathBuf;
use std::sync::Arc;

/// Reads an `.onnx` artifact from disk and builds a session for it.
pub struct OnnxModelLoader {
    path: PathBuf,
    input_width: u32,
    input_height: u32,
}

impl OnnxModelLoader {
    pub fn new(path: impl Into<PathBuf>, input_width: u32, input_height: u32) -> Self {
        Self {
            path: path.into(),
            input_width,
            input_height,
        }
    }
}

#[async_trait]
impl ModelLoader for OnnxModelLoader {
    async fn load(&self) -> Result<Arc<dyn ModelRuntime>, ModelLoadError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ModelLoadError::NotFound {
                    path: self.path.display().to_string(),
                }
            } else {
                ModelLoadError::Io(e.to_string())
            }
        })?;
        if bytes.is_empty() {
            return Err(ModelLoadError::Corrupt(format!(
                "model file '{}' is empty",
                self.path.display()
            )));
        }

        if !is_initialized() {
            tracing::warn!(
                "ORT not initialized - call initialize_ort() at app startup for hardware acceleration"
            );
        }
        let providers = get_ep_info()
            .map(|info| info.active_providers.join(", "))
            .unwrap_or_else(|| "CPU".to_string());

        let (width, height) = (self.input_width, self.input_height);
        let session = tokio::task::spawn_blocking(move || -> Result<Session, ModelLoadError> {
            let session = Session::builder()
                .and_then(|builder| builder.commit_from_memory(&bytes))
                .map_err(|e| ModelLoadError::Corrupt(e.to_string()))?;
            verify_input_shape(&session, width, height)?;
            Ok(session)
        })
        .await
        .map_err(|e| ModelLoadError::Io(e.to_string()))??;

        Ok(Arc::new(OnnxRuntime {
            session: Mutex::new(session),
            providers,
        }))
    }
}

/// The classifier expects `[1, 3, H, W]`; dynamic dimensions are accepted.
fn verify_input_shape(session: &Session, width: u32, height: u32) -> Result<(), ModelLoadError> {
    let input = session
        .inputs
        .first()
        .ok_or_else(|| ModelLoadError::Corrupt("model declares no inputs".to_string()))?;
    let dims: Vec<i64> = input
        .input_type
        .tensor_shape()
        .map(|shape| shape.iter().copied().collect())
        .ok_or_else(|| ModelLoadError::Corrupt("model input is not a tensor".to_string()))?;

    let expected = [1, 3, height as i64, width as i64];
    let compatible = dims.len() == expected.len()
        && dims
            .iter()
            .zip(expected.iter())
            .all(|(actual, wanted)| *actual < 0 || actual == wanted);
    if !compatible {
        return Err(ModelLoadError::IncompatibleShape {
            expected,
            actual: dims,
        });
    }
    Ok(())
}

/// ONNX Runtime needs exclusive access to run a session, so forward passes
/// are serialized.
struct OnnxRuntime {
    session: Mutex<Session>,
    providers: String,
}

impl ModelRuntime for OnnxRuntime {
    fn run(&self, tensor: ImageTensor) -> Result<Vec<f32>, InferenceError> {
        let input = Value::from_array(tensor.into_array())
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(inputs![input])
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| InferenceError::Runtime("no output from model".to_string()))?;
        let logits = output
            .try_extract_array::<f32>()
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        Ok(logits.iter().copied().collect())
    }

    fn backend(&self) -> String {
        format!("onnxruntime ({})", self.providers)
    }
}
