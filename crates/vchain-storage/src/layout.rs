//! Object key layout.
//!
//! ```text
//! videos/{owner}/{segment_id}.mp4                  generated segment
//! frames/{owner}/{segment_id}/frame_*.jpeg         extracted last frame
//! videos/{owner}/{job_id}_output/final_output.mp4  stitched result
//! ```

/// Name of the stitched output file (without extension).
pub const FINAL_OUTPUT_NAME: &str = "final_output";

/// Prefix of sprite-sheet frames written by the transcoder.
pub const FRAME_FILE_PREFIX: &str = "frame_";

pub fn segment_key(owner_id: &str, segment_id: &str) -> String {
    format!("videos/{}/{}.mp4", owner_id, segment_id)
}

/// Output directory handed to the transcoder for frame extraction.
pub fn frame_dir(owner_id: &str, segment_id: &str) -> String {
    format!("frames/{}/{}/", owner_id, segment_id)
}

/// Listing prefix of the extracted frame files.
pub fn frame_prefix(owner_id: &str, segment_id: &str) -> String {
    format!("{}{}", frame_dir(owner_id, segment_id), FRAME_FILE_PREFIX)
}

/// Output directory handed to the transcoder for stitching.
pub fn output_dir(owner_id: &str, job_id: &str) -> String {
    format!("videos/{}/{}_output/", owner_id, job_id)
}

pub fn final_output_key(owner_id: &str, job_id: &str) -> String {
    format!("{}{}.mp4", output_dir(owner_id, job_id), FINAL_OUTPUT_NAME)
}
