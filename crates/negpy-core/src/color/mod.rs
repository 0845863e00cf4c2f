//! Color space support for the Lab-tools and CLAHE stages.

mod lab;


pub use lab::{lab_to_rgb, rgb_to_lab, Lab};
