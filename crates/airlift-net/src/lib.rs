#![forbid(unsafe_code)]

mod client;
mod error;
mod retry;
mod traits;
mod types;

pub use crate::{
    client::HttpClient,
    error::{NetError, NetResult},
    retry::{DefaultRetryPolicy, RetryNet},
    traits::{ByteStream, Net, NetExt},
    types::{Headers, NetOptions, RetryPolicy},
};
