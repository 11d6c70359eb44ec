pub mod blob_detector;
pub mod candidate;
pub mod decision;
pub mod dispatcher;
pub mod frame;
pub mod frame_processor;
pub mod mask;
pub mod moment;
pub mod pixel;
pub mod tracker;
