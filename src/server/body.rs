//! Response bodies

use bytes::{Bytes, BytesMut};
use futures::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use std::io;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Read size for streamed files
const CHUNK_SIZE: usize = 64 * 1024;

/// Body type of every response produced by the server
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// A body holding `bytes` in memory
pub fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A body with no content
pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Stream `file` in chunks until EOF
pub fn file_stream(file: File) -> ResponseBody {
    StreamBody::new(stream::try_unfold(file, next_chunk)).boxed_unsync()
}

async fn next_chunk(mut file: File) -> io::Result<Option<(Frame<Bytes>, File)>> {
    let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
    let read = file.read_buf(&mut buf).await?;
    if read == 0 {
        Ok(None)
    } else {
        Ok(Some((Frame::data(buf.freeze()), file)))
    }
}
