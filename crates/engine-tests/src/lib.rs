#![allow(dead_code)]

pub mod recovery;
pub mod utils;

/// `sha256("123TEST")`, the alt_id of device 123 under the test salt.
pub const ALT_ID_123_TEST: &str =
    "8934c9c641f2e7bb700a43304df2c2f1ca2ee89e62217b056c172f2e474a80e9";

/// `sha256("123OTHER")`, the alt_id of device 123 after re-salting.
pub const ALT_ID_123_OTHER: &str =
    "ce19061f99c516aa9ae68373c33da23e59ad33a3479c8325af4de2f2242e9970";
