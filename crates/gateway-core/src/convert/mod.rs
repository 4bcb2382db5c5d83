//! Fetch, unpack, and convert an inbound model descriptor down to a TFLite
//! flatbuffer. Grounded in `original_source/server/types/model.py`.
//!
//! The three stages are kept distinct because each has its own error
//! surface: fetch can fail on the network or filesystem, unpack can fail on
//! a malformed archive, and conversion can fail on a missing external
//! toolchain or a format we don't know how to walk yet.

mod path;

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::GatewayError;
use crate::wire::{ModelFormat, ModelSource};

pub use path::build_path;

/// Roots a `file` source is allowed to resolve under. Empty means no `file`
/// sources are permitted at all.
#[derive(Debug, Clone, Default)]
pub struct PermittedRoots(pub Vec<PathBuf>);

/// Relative path (inside the conversion working directory) that holds the
/// canonical representation of each format. A trailing slash means the
/// format is a directory and must be produced by unzipping.
fn canonical_path(format: ModelFormat) -> &'static str {
    match format {
        ModelFormat::TfliteFlatBuffer => "tflite_model.tflite",
        ModelFormat::TfSavedModel => "tf_saved_model/",
        ModelFormat::KerasHdf5 => "keras_model.h5",
        ModelFormat::KerasSavedModel => "keras_saved_model/",
        ModelFormat::KerasOther => "keras_model_other.h5",
        ModelFormat::TfjsLayers => "tfjs_layers_model.json",
        ModelFormat::TfjsGraph => "tfjs_graph_model/",
        ModelFormat::TfHub => "tf_hub_model.tfhub",
        ModelFormat::GraphDefs => "graph_defs.gdefs",
    }
}

fn is_directory_format(format: ModelFormat) -> bool {
    canonical_path(format).ends_with('/')
}

/// Fetch the raw bytes of a model from whichever source the descriptor
/// names, enforcing that `file` sources stay within `permitted`.
pub async fn fetch(
    source: &ModelSource,
    permitted: &PermittedRoots,
) -> Result<Vec<u8>, GatewayError> {
    match source {
        ModelSource::Data { data } => Ok(data.clone()),
        ModelSource::Url { url } => {
            let response = reqwest::get(url).await.map_err(|e| {
                GatewayError::ModelAcquireError(format!(
                    "encountered an error while trying to get the model from `{url}`: {e}"
                ))
            })?;
            let bytes = response.bytes().await.map_err(|e| {
                GatewayError::ModelAcquireError(format!(
                    "encountered an error while trying to get the model from `{url}`: {e}"
                ))
            })?;
            Ok(bytes.to_vec())
        }
        ModelSource::File { file } => {
            if permitted.0.is_empty() {
                return Err(GatewayError::ModelAcquireError(
                    "file sources are not permitted on this gateway".into(),
                ));
            }
            let resolved = path::build_path(&permitted.0, file).map_err(|e| {
                GatewayError::ModelAcquireError(format!(
                    "encountered an error while trying to get the model from `{file}`: {e}"
                ))
            })?;
            tokio::fs::read(&resolved).await.map_err(|e| {
                GatewayError::ModelAcquireError(format!(
                    "encountered an error while trying to get the model from `{file}`: {e}"
                ))
            })
        }
    }
}

/// For a TFJS-layers/graph model fetched from a URL, `original` is the
/// `model.json` manifest, not the weights themselves. Parse its
/// `weightsManifest[*].paths` list and fetch each shard from the same base
/// URL, writing them alongside the canonical unpack path so the external
/// converter can find them next to the manifest.
async fn fetch_tfjs_weight_shards(
    manifest: &[u8],
    base_url: &str,
    format: ModelFormat,
    directory: &Path,
) -> Result<(), GatewayError> {
    let parsed: serde_json::Value = serde_json::from_slice(manifest).map_err(|e| {
        GatewayError::ModelDataError(format!(
            "encountered an error while trying to parse the TFJS weight manifest: {e}"
        ))
    })?;

    let shards = parsed
        .get("weightsManifest")
        .and_then(|m| m.as_array())
        .ok_or_else(|| {
            GatewayError::ModelDataError(
                "TFJS weight manifest is missing `weightsManifest`".into(),
            )
        })?
        .iter()
        .flat_map(|entry| {
            entry
                .get("paths")
                .and_then(|p| p.as_array())
                .into_iter()
                .flatten()
                .filter_map(|p| p.as_str())
        });

    let base = base_url.rsplit_once('/').map(|(base, _)| base).unwrap_or(base_url);
    let shard_dir = if is_directory_format(format) {
        directory.join(canonical_path(format))
    } else {
        directory.to_path_buf()
    };
    std::fs::create_dir_all(&shard_dir).map_err(|e| {
        GatewayError::ModelDataError(format!("couldn't create `{}`: {e}", shard_dir.display()))
    })?;

    for shard_path in shards {
        let shard_url = format!("{base}/{shard_path}");
        let response = reqwest::get(&shard_url).await.map_err(|e| {
            GatewayError::ModelAcquireError(format!(
                "encountered an error while trying to get the model weight shard from \
                 `{shard_url}`: {e}"
            ))
        })?;
        let bytes = response.bytes().await.map_err(|e| {
            GatewayError::ModelAcquireError(format!(
                "encountered an error while trying to get the model weight shard from \
                 `{shard_url}`: {e}"
            ))
        })?;

        let target = shard_dir.join(shard_path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        std::fs::write(&target, &bytes).map_err(|e| {
            GatewayError::ModelDataError(format!("couldn't write `{}`: {e}", target.display()))
        })?;
    }

    Ok(())
}

/// Place the fetched bytes at the canonical path for `format` inside
/// `directory`, unzipping first if that canonical path is a directory.
pub fn unpack(
    raw: &[u8],
    format: ModelFormat,
    directory: &Path,
) -> Result<PathBuf, GatewayError> {
    let target = directory.join(canonical_path(format));

    if is_directory_format(format) {
        std::fs::create_dir_all(&target).map_err(|e| {
            GatewayError::ModelDataError(format!("couldn't create `{}`: {e}", target.display()))
        })?;
        let cursor = std::io::Cursor::new(raw);
        let mut archive = zip::ZipArchive::new(cursor).map_err(|e| {
            GatewayError::ModelDataError(format!(
                "encountered an error while trying to unzip the data provided for the model: \
                 `{e}`; did you remember to zip the model folder? (we expect a zipped folder \
                 for models of type {format:?})"
            ))
        })?;
        archive.extract(&target).map_err(|e| {
            GatewayError::ModelDataError(format!(
                "encountered an error while trying to unzip the data provided for the model: `{e}`"
            ))
        })?;
    } else {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        std::fs::write(&target, raw).map_err(|e| {
            GatewayError::ModelDataError(format!("couldn't write `{}`: {e}", target.display()))
        })?;
    }

    Ok(target)
}

/// One hop in the conversion graph: either the format is already canonical
/// (`Identity`), we don't yet walk it (`Unimplemented`), or running an
/// external converter against `input` produces the next format's canonical
/// file and we loop again.
enum Step {
    Identity,
    Unimplemented,
    Convert(ModelFormat),
}

fn step_for(format: ModelFormat) -> Step {
    match format {
        ModelFormat::TfliteFlatBuffer => Step::Identity,
        ModelFormat::TfSavedModel => Step::Convert(ModelFormat::TfliteFlatBuffer),
        ModelFormat::KerasHdf5 => Step::Convert(ModelFormat::TfliteFlatBuffer),
        ModelFormat::KerasSavedModel => Step::Convert(ModelFormat::TfjsLayers),
        ModelFormat::KerasOther => Step::Convert(ModelFormat::TfjsLayers),
        ModelFormat::TfjsLayers => Step::Convert(ModelFormat::KerasHdf5),
        ModelFormat::TfjsGraph => Step::Unimplemented,
        ModelFormat::TfHub => Step::Unimplemented,
        ModelFormat::GraphDefs => Step::Unimplemented,
    }
}

/// Run the external converter that takes `from`'s canonical file/directory
/// and produces `to`'s canonical file, inside `directory`.
async fn run_converter(
    from: ModelFormat,
    to: ModelFormat,
    directory: &Path,
) -> Result<(), GatewayError> {
    let input = directory.join(canonical_path(from));
    let output = directory.join(canonical_path(to));

    let mut cmd = match (from, to) {
        (ModelFormat::TfSavedModel, ModelFormat::TfliteFlatBuffer) => {
            let mut c = Command::new("tflite_convert");
            c.arg("--saved_model_dir").arg(&input);
            c.arg("--output_file").arg(&output);
            c
        }
        (ModelFormat::KerasHdf5, ModelFormat::TfliteFlatBuffer) => {
            let mut c = Command::new("tflite_convert");
            c.arg("--keras_model_file").arg(&input);
            c.arg("--output_file").arg(&output);
            c
        }
        (ModelFormat::KerasSavedModel, ModelFormat::TfjsLayers)
        | (ModelFormat::KerasOther, ModelFormat::TfjsLayers) => {
            let mut c = Command::new("tensorflowjs_converter");
            c.arg("--input_format").arg(if from == ModelFormat::KerasSavedModel {
                "keras_saved_model"
            } else {
                "keras"
            });
            c.arg("--output_format").arg("tfjs_layers_model");
            c.arg(&input);
            c.arg(output.parent().unwrap_or(directory));
            c
        }
        (ModelFormat::TfjsLayers, ModelFormat::KerasHdf5) => {
            let mut c = Command::new("tensorflowjs_converter");
            c.arg("--input_format").arg("tfjs_layers_model");
            c.arg("--output_format").arg("keras");
            c.arg(&input);
            c.arg(&output);
            c
        }
        _ => {
            return Err(GatewayError::ModelConversionError(format!(
                "unsupported model type (`{from:?}`): no conversion function available!"
            )))
        }
    };

    let status = cmd.status().await.map_err(|e| {
        GatewayError::ModelConversionError(format!(
            "hit an error converting a `{from:?}` model: {e}"
        ))
    })?;

    if !status.success() {
        return Err(GatewayError::ModelConversionError(format!(
            "hit an error converting a `{from:?}` model: converter exited with {status}"
        )));
    }

    Ok(())
}

/// Walk the conversion graph from `format` down to a TFLite flatbuffer,
/// returning its bytes. `directory` already holds `format`'s canonical
/// file, placed there by [`unpack`].
pub async fn convert(format: ModelFormat, directory: &Path) -> Result<Vec<u8>, GatewayError> {
    let mut current = format;
    loop {
        match step_for(current) {
            Step::Identity => {
                let path = directory.join(canonical_path(current));
                return std::fs::read(&path).map_err(|e| {
                    GatewayError::ModelConversionError(format!(
                        "hit an error converting a `{current:?}` model: {e}"
                    ))
                });
            }
            Step::Unimplemented => {
                return Err(GatewayError::ModelConversionError(format!(
                    "sorry! converting `{current:?}` models isn't supported yet."
                )));
            }
            Step::Convert(next) => {
                run_converter(current, next, directory).await?;
                current = next;
            }
        }
    }
}

/// Top-level entry point: fetch the descriptor's bytes, lay them out in a
/// scratch directory, and convert down to a TFLite flatbuffer.
///
/// The scratch directory is cleaned up according to `delete_after_conversion`:
/// when true it is removed once the flatbuffer bytes are read back into
/// memory; when false it is left on disk for inspection.
pub async fn convert_model(
    source: &ModelSource,
    format: ModelFormat,
    permitted: &PermittedRoots,
    delete_after_conversion: bool,
) -> Result<Vec<u8>, GatewayError> {
    let raw = fetch(source, permitted).await?;

    let scratch = tempfile::Builder::new()
        .prefix("gateway-convert-")
        .tempdir()
        .map_err(|e| GatewayError::Other(anyhow::anyhow!("couldn't create scratch dir: {e}")))?;

    if let (ModelSource::Url { url }, ModelFormat::TfjsLayers | ModelFormat::TfjsGraph) =
        (source, format)
    {
        fetch_tfjs_weight_shards(&raw, url, format, scratch.path()).await?;
    }

    unpack(&raw, format, scratch.path())?;
    let result = convert(format, scratch.path()).await;

    if delete_after_conversion {
        drop(scratch);
    } else {
        let _ = scratch.into_path();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_format_reads_back_the_bytes_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"\x1cTFL3-not-really-but-fine".to_vec();
        unpack(&bytes, ModelFormat::TfliteFlatBuffer, dir.path()).unwrap();
        let out = convert(ModelFormat::TfliteFlatBuffer, dir.path())
            .await
            .unwrap();
        assert_eq!(out, bytes);
    }

    #[tokio::test]
    async fn unimplemented_format_reports_model_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        unpack(&[0u8; 4], ModelFormat::TfjsGraph, dir.path()).unwrap();
        let err = convert(ModelFormat::TfjsGraph, dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ModelConversionError);
    }

    #[tokio::test]
    async fn data_source_is_fetched_verbatim() {
        let source = ModelSource::Data {
            data: vec![1, 2, 3],
        };
        let bytes = fetch(&source, &PermittedRoots::default()).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn file_source_is_rejected_without_permitted_roots() {
        let source = ModelSource::File {
            file: "model.tflite".into(),
        };
        let err = fetch(&source, &PermittedRoots::default()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ModelAcquireError);
    }

    #[tokio::test]
    async fn tfjs_weight_manifest_shards_are_fetched_alongside_the_manifest() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let manifest = serde_json::json!({
            "weightsManifest": [
                { "paths": ["group1-shard1of2.bin"], "weights": [] },
                { "paths": ["group1-shard2of2.bin"], "weights": [] },
            ]
        });

        Mock::given(method("GET"))
            .and(path("/group1-shard1of2.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"shard-one".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/group1-shard2of2.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"shard-two".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let base_url = format!("{}/model.json", server.uri());
        fetch_tfjs_weight_shards(
            manifest.to_string().as_bytes(),
            &base_url,
            ModelFormat::TfjsLayers,
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("group1-shard1of2.bin")).unwrap(),
            b"shard-one"
        );
        assert_eq!(
            std::fs::read(dir.path().join("group1-shard2of2.bin")).unwrap(),
            b"shard-two"
        );
    }

    #[tokio::test]
    async fn malformed_tfjs_weight_manifest_reports_model_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetch_tfjs_weight_shards(
            b"not json",
            "http://example.invalid/model.json",
            ModelFormat::TfjsLayers,
            dir.path(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ModelDataError);
    }
}
