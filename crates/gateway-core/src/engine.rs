//! Shape/batch reconciliation and invocation. Grounded in
//! `model_store.py`'s `_check_tensor`/`_resize`/`_run_batch`/`predict`
//! chain; generalized from that source's single-input assumption to
//! handle an arbitrary number of model inputs.

use std::time::Instant;

use crate::error::GatewayError;
use crate::interpreter::{Interpreter, Signature};
use crate::tensor::{Dtype, Tensor};

#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub time_to_execute_us: u64,
    pub trace_url: Option<String>,
}

/// Coerce `tensor` to `expected`, casting from i32 for the runtime-only
/// narrow/wide int dtypes and otherwise requiring an exact dtype match.
fn coerce_dtype(tensor: Tensor, expected: Dtype) -> Result<Tensor, GatewayError> {
    if tensor.dtype() == expected {
        return Ok(tensor);
    }
    if matches!(expected, Dtype::I8 | Dtype::U8 | Dtype::I16 | Dtype::I64) && tensor.dtype() == Dtype::I32 {
        return tensor.cast_from_i32(expected);
    }
    Err(GatewayError::TensorTypeError(format!(
        "data types don't match; expected: `{expected:?}`, got: `{:?}`",
        tensor.dtype()
    )))
}

fn dims_u64(shape: &[usize]) -> Vec<u64> {
    shape.iter().map(|&d| d as u64).collect()
}

fn eq_dims(expected: &[Option<u64>], actual: &[u64]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual.iter())
            .all(|(e, a)| e.map_or(true, |v| v == *a))
}

/// Fill `None` entries in `expected` with the corresponding value from
/// `actual`, producing a fully concrete shape to resize/reshape against.
fn concretize(expected: &[Option<u64>], actual: &[u64]) -> Vec<u64> {
    expected
        .iter()
        .zip(actual.iter())
        .map(|(e, a)| e.unwrap_or(*a))
        .collect()
}

fn describe_accepted_shapes(expected: &[Option<u64>]) -> String {
    let def_shape: Vec<String> = expected
        .iter()
        .map(|d| d.map(|v| v.to_string()).unwrap_or_else(|| "?".into()))
        .collect();
    let batch_shape: Vec<String> = std::iter::once("X".to_string())
        .chain(def_shape.iter().cloned())
        .collect();

    if expected.first() == Some(&Some(1)) {
        let singular: Vec<String> = def_shape[1..].to_vec();
        let manual_batch: Vec<String> = std::iter::once("X".to_string())
            .chain(singular.iter().cloned())
            .collect();
        format!(
            "`[{}]`, `[{}]` (batch), `[{}]` (batch), or `[{}]` (singular)",
            def_shape.join(", "),
            batch_shape.join(", "),
            manual_batch.join(", "),
            singular.join(", ")
        )
    } else {
        format!(
            "`[{}]` or `[{}]` (batch)",
            def_shape.join(", "),
            batch_shape.join(", ")
        )
    }
}

/// The outcome of classifying and resizing one input: its (possibly
/// reshaped, not-yet-batch-wrapped) tensor, and the manual batch size it
/// demands, if any.
struct Classified {
    tensor: Tensor,
    manual_batch: Option<u64>,
}

fn classify_and_resize(
    interp: &mut dyn Interpreter,
    index: usize,
    sig: &Signature,
    tensor: Tensor,
) -> Result<Classified, GatewayError> {
    let expected = &sig.shape;
    let rx = expected.len();
    let s_usize = tensor.shape.clone();
    let s = dims_u64(&s_usize);
    let rs = s.len();

    // native batch: no declared batch dim at all.
    if rs == rx + 1 && eq_dims(expected, &s[1..]) {
        let backup = s[1..].to_vec();
        return match interp.resize_input(index, &s) {
            Ok(()) => Ok(Classified {
                tensor,
                manual_batch: None,
            }),
            Err(_) => {
                interp.resize_input(index, &backup).map_err(|e| {
                    GatewayError::TensorTypeError(format!(
                        "unable to resize the model's input tensor to match the given tensor; \
                         attempted `{backup:?}` last and got `{e}`."
                    ))
                })?;
                Ok(Classified {
                    tensor,
                    manual_batch: Some(s[0]),
                })
            }
        };
    }

    // leading-dim batch: declared batch dim of 1, caller sent a different count.
    if rs == rx
        && expected.first() == Some(&Some(1))
        && s[0] != 1
        && eq_dims(&expected[1..], &s[1..])
    {
        let backup = concretize(expected, &s);
        return match interp.resize_input(index, &s) {
            Ok(()) => Ok(Classified {
                tensor,
                manual_batch: None,
            }),
            Err(_) => {
                interp.resize_input(index, &backup).map_err(|e| {
                    GatewayError::TensorTypeError(format!(
                        "unable to resize the model's input tensor to match the given tensor; \
                         attempted `{backup:?}` last and got `{e}`."
                    ))
                })?;
                let mut reshaped_dims = vec![s[0]];
                reshaped_dims.extend(backup.iter().copied());
                let reshaped = tensor.reshaped(reshaped_dims.iter().map(|&d| d as usize).collect());
                Ok(Classified {
                    tensor: reshaped,
                    manual_batch: Some(s[0]),
                })
            }
        };
    }

    // singular: model wants a batch of one, caller sent the bare element.
    if rs + 1 == rx && expected.first() == Some(&Some(1)) && eq_dims(&expected[1..], &s) {
        let full = concretize(expected, &{
            let mut padded = vec![1u64];
            padded.extend(s.iter().copied());
            padded
        });
        interp.resize_input(index, &full).map_err(|e| {
            GatewayError::TensorTypeError(format!(
                "unable to resize the model's input tensor to match the given tensor; \
                 attempted `{full:?}` last and got `{e}`."
            ))
        })?;
        let reshaped = tensor.reshaped(full.iter().map(|&d| d as usize).collect());
        return Ok(Classified {
            tensor: reshaped,
            manual_batch: None,
        });
    }

    // identity.
    if eq_dims(expected, &s) {
        interp.resize_input(index, &s).map_err(|e| {
            GatewayError::TensorTypeError(format!(
                "unable to resize the model's input tensor to match the given tensor; \
                 attempted `{s:?}` last and got `{e}`."
            ))
        })?;
        return Ok(Classified {
            tensor,
            manual_batch: None,
        });
    }

    Err(GatewayError::TensorTypeError(format!(
        "tensor shape mismatch; expected {}, got: `{:?}`",
        describe_accepted_shapes(expected),
        s_usize
    )))
}

/// Run `interp` against `inputs`, one wire-decoded tensor per declared
/// input slot, returning the output tensors and execution metrics.
pub fn predict(
    interp: &mut dyn Interpreter,
    inputs: Vec<Tensor>,
) -> Result<(Vec<Tensor>, Metrics), GatewayError> {
    let signatures = interp.input_signatures().to_vec();

    if inputs.len() != signatures.len() {
        return Err(GatewayError::TensorTypeError(format!(
            "expected {} input tensor(s), got {}",
            signatures.len(),
            inputs.len()
        )));
    }

    let mut batched = Vec::with_capacity(inputs.len());
    let mut manual_batches: Vec<u64> = Vec::with_capacity(inputs.len());

    for (i, (tensor, sig)) in inputs.into_iter().zip(signatures.iter()).enumerate() {
        let tensor = coerce_dtype(tensor, sig.dtype)?;
        let classified = classify_and_resize(interp, i, sig, tensor)?;

        let (tensor, mb) = match classified.manual_batch {
            Some(mb) => (classified.tensor, mb),
            None => (classified.tensor.wrapped_outer(), 1),
        };
        batched.push(tensor);
        manual_batches.push(mb);
    }

    let mb = manual_batches.first().copied().unwrap_or(1);
    if manual_batches.iter().any(|&m| m != mb) {
        return Err(GatewayError::TensorTypeError(format!(
            "inputs disagree on manual batch size: observed {manual_batches:?} with shapes {:?}",
            batched.iter().map(|t| &t.shape).collect::<Vec<_>>()
        )));
    }

    let output_count = interp.output_count();
    let mut accumulators: Vec<Vec<Tensor>> = vec![Vec::with_capacity(mb as usize); output_count];
    let mut total_us: u64 = 0;

    for k in 0..mb as usize {
        for (i, batch_tensor) in batched.iter().enumerate() {
            interp.set_input(i, batch_tensor.slice_leading(k))?;
        }

        let begin = Instant::now();
        interp.invoke().map_err(|e| {
            GatewayError::Other(anyhow::anyhow!(
                "encountered an error while trying to run inference: {e}"
            ))
        })?;
        total_us += begin.elapsed().as_micros() as u64;

        for j in 0..output_count {
            accumulators[j].push(interp.get_output(j)?);
        }
    }

    let outputs = accumulators
        .into_iter()
        .map(Tensor::concat_leading)
        .collect();

    Ok((
        outputs,
        Metrics {
            time_to_execute_us: total_us,
            trace_url: None,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorData;

    struct SingleInput {
        sig: Signature,
        current: Vec<u64>,
        staged: Option<Tensor>,
        last_output: Option<Tensor>,
    }

    impl Interpreter for SingleInput {
        fn input_signatures(&self) -> &[Signature] {
            std::slice::from_ref(&self.sig)
        }
        fn output_count(&self) -> usize {
            1
        }
        fn resize_input(&mut self, _index: usize, shape: &[u64]) -> Result<(), GatewayError> {
            self.current = shape.to_vec();
            Ok(())
        }
        fn set_input(&mut self, _index: usize, tensor: Tensor) -> Result<(), GatewayError> {
            self.staged = Some(tensor);
            Ok(())
        }
        fn invoke(&mut self) -> Result<(), GatewayError> {
            self.last_output = self.staged.take();
            Ok(())
        }
        fn get_output(&self, _index: usize) -> Result<Tensor, GatewayError> {
            self.last_output
                .clone()
                .ok_or_else(|| GatewayError::Other(anyhow::anyhow!("no output")))
        }
    }

    #[test]
    fn identity_shape_runs_a_single_invocation() {
        let mut interp = SingleInput {
            sig: Signature {
                dtype: Dtype::I32,
                shape: vec![Some(3)],
            },
            current: vec![3],
            staged: None,
            last_output: None,
        };
        let input = Tensor::new(vec![3], TensorData::I32(vec![1, 2, 3]));
        let (outputs, metrics) = predict(&mut interp, vec![input.clone()]).unwrap();
        assert_eq!(outputs, vec![input]);
        assert!(metrics.time_to_execute_us < 1_000_000);
    }

    #[test]
    fn manual_batch_fallback_runs_once_per_batch_element() {
        struct ManualOnly {
            sig: Signature,
            staged: Option<Tensor>,
            last_output: Option<Tensor>,
            invocations: usize,
        }
        impl Interpreter for ManualOnly {
            fn input_signatures(&self) -> &[Signature] {
                std::slice::from_ref(&self.sig)
            }
            fn output_count(&self) -> usize {
                1
            }
            fn resize_input(&mut self, _index: usize, shape: &[u64]) -> Result<(), GatewayError> {
                // Only accept resizes matching the declared rank (rejects
                // the native multi-item attempt, forcing the fallback).
                if shape.len() == self.sig.shape.len() {
                    Ok(())
                } else {
                    Err(GatewayError::TensorTypeError("no native batching".into()))
                }
            }
            fn set_input(&mut self, _index: usize, tensor: Tensor) -> Result<(), GatewayError> {
                self.staged = Some(tensor);
                Ok(())
            }
            fn invoke(&mut self) -> Result<(), GatewayError> {
                self.invocations += 1;
                // Like a real TFLite model, the declared output keeps its
                // own leading batch dimension even when run one item at a
                // time.
                self.last_output = self.staged.take().map(Tensor::wrapped_outer);
                Ok(())
            }
            fn get_output(&self, _index: usize) -> Result<Tensor, GatewayError> {
                self.last_output
                    .clone()
                    .ok_or_else(|| GatewayError::Other(anyhow::anyhow!("no output")))
            }
        }

        let mut interp = ManualOnly {
            sig: Signature {
                dtype: Dtype::F32,
                shape: vec![Some(28), Some(28), Some(1)],
            },
            staged: None,
            last_output: None,
            invocations: 0,
        };

        let input = Tensor::new(vec![2, 28, 28, 1], TensorData::F32(vec![0.0; 2 * 28 * 28]));
        let (outputs, _metrics) = predict(&mut interp, vec![input]).unwrap();
        assert_eq!(interp.invocations, 2);
        assert_eq!(outputs[0].shape, vec![2, 28, 28, 1]);
    }

    #[test]
    fn mismatched_shape_is_a_tensor_type_error() {
        let mut interp = SingleInput {
            sig: Signature {
                dtype: Dtype::F32,
                shape: vec![Some(4)],
            },
            current: vec![4],
            staged: None,
            last_output: None,
        };
        let input = Tensor::new(vec![5], TensorData::F32(vec![0.0; 5]));
        let err = predict(&mut interp, vec![input]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TensorTypeError);
    }

    #[test]
    fn wrong_input_count_is_rejected() {
        let mut interp = SingleInput {
            sig: Signature {
                dtype: Dtype::F32,
                shape: vec![Some(3)],
            },
            current: vec![3],
            staged: None,
            last_output: None,
        };
        let err = predict(&mut interp, vec![]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TensorTypeError);
    }
}
