pub mod landmarks;
pub mod template;

pub use landmarks::{
    index, HandFrame, HandSet, LandmarkPoint, HAND_CONNECTIONS, HAND_LANDMARK_COUNT, MAX_HANDS,
};
pub use template::{GestureTemplate, TestRecord};
