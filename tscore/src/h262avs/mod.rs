//! H.262 and AVS picture assembly.

pub mod picture;

pub use picture::{
    classify, Assembler, ItemKind, Picture, PictureItem, Standard, AVS_B_PICTURE_CODING,
    AVS_I_PICTURE_CODING, AVS_P_PICTURE_CODING, H262_I_PICTURE_CODING,
};
