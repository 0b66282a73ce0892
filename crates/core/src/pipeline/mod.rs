pub mod detect_image_use_case;
pub mod frame_pipeline;
