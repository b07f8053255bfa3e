//! Long-running worker tasks

mod accept_sign_task;

pub use accept_sign_task::{
    AcceptError, AcceptHistory, AcceptRecord, AcceptSignTask, spawn,
    verify_sign_info,
};
