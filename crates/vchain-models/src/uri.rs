//! Storage URI helpers.

use url::Url;

const GCS_PUBLIC_HOST: &str = "storage.googleapis.com";

/// Normalize a bucket object reference to `gs://bucket/path` form.
///
/// `https://storage.googleapis.com/bucket/path` is rewritten; anything else
/// (already `gs://`, or a non-GCS URL) is returned unchanged.
pub fn to_gcs_uri(uri: &str) -> String {
    if uri.starts_with("gs://") {
        return uri.to_string();
    }

    let Ok(parsed) = Url::parse(uri) else {
        return uri.to_string();
    };

    if parsed.host_str() != Some(GCS_PUBLIC_HOST) {
        return uri.to_string();
    }

    let path = parsed.path().trim_start_matches('/');
    if path.is_empty() {
        return uri.to_string();
    }

    format!("gs://{}", path)
}
