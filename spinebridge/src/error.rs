use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("resolution cancelled")]
    Cancelled,

    #[error("unsupported asset scheme in '{uri}'")]
    UnsupportedScheme { uri: String },

    #[error("malformed data URI: {message}")]
    MalformedDataUri { message: String },

    #[error("unknown bundled asset: {name}")]
    UnknownBundleAsset { name: String },

    #[error("failed to fetch '{url}': {message}")]
    Fetch { url: String, message: String },

    #[error("asset I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to probe image dimensions for '{path}': {message}")]
    ImageProbe { path: String, message: String },

    #[error("failed to decode image '{path}': {message}")]
    ImageDecode { path: String, message: String },

    #[error("failed to parse atlas page metadata: {message}")]
    AtlasParse { message: String },

    #[error("unknown texture filter: {value}")]
    UnknownFilter { value: String },

    #[error("unknown texture wrap: {value}")]
    UnknownWrap { value: String },

    #[error("unknown blend mode: {value}")]
    UnknownBlend { value: String },

    #[error("skeleton data is not valid JSON: {message}")]
    SkeletonJson { message: String },
}
