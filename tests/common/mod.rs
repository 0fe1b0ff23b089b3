#![allow(dead_code)]

pub mod assertions;
pub mod fakes;
pub mod vectors;
