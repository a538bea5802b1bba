// Wand Inference - Tasks
//
// `sensor`: fixed-rate sampling into the double buffer (high priority).
// `ai`: drains slabs into the ring window and runs the classifier.

pub mod ai;
pub mod sensor;
