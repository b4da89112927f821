//! Chunked streaming
//!
//! Pages through a result with `LIMIT chunk OFFSET n` so large result sets
//! never sit in memory at once. The token's own limit and offset bound the
//! walk; a short chunk ends it.

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::compiler::NativeQuery;
use crate::observability::{log_event_with_fields, Event};
use crate::token::Token;
use crate::value::Row;

use super::errors::{ExecError, ExecResult};
use super::executor::{ExecOptions, Executor};

struct ChunkState {
    exec: Executor,
    query: NativeQuery,
    base_offset: u64,
    /// Rows still allowed by the token's limit, `None` when unbounded
    remaining: Option<u64>,
    fetched: u64,
    chunk_size: u64,
    done: bool,
}

impl Executor {
    /// Stream rows in chunks of at most `stream_chunk_size`
    pub fn stream(&self, token: &Token, opts: ExecOptions) -> BoxStream<'static, ExecResult<Vec<Row>>> {
        if !token.has_limit() && !token.has_pagination() {
            let source = token.source().describe();
            log_event_with_fields(Event::UnboundedStream, &[("source", source.as_str())]);
        }

        let query = match self.compiler.compile(token) {
            Ok(query) => query,
            Err(e) => return stream::once(async move { Err(ExecError::from(e)) }).boxed(),
        };

        let state = ChunkState {
            exec: self.clone(),
            base_offset: query.offset.unwrap_or(0),
            remaining: query.limit,
            query,
            fetched: 0,
            chunk_size: self.config().stream_chunk_size.max(1),
            done: false,
        };
        let timeout = opts.timeout.unwrap_or_else(|| self.config().query_timeout());

        stream::unfold(state, move |mut state| async move {
            if state.done || state.remaining == Some(0) {
                return None;
            }
            let size = match state.remaining {
                Some(left) => left.min(state.chunk_size),
                None => state.chunk_size,
            };
            let mut chunk = state.query.clone();
            chunk.limit = Some(size);
            chunk.offset = Some(state.base_offset + state.fetched).filter(|o| *o > 0);

            match state.exec.fetch(chunk, timeout).await {
                Ok(rows) => {
                    let got = rows.len() as u64;
                    state.fetched += got;
                    state.remaining = state.remaining.map(|left| left.saturating_sub(got));
                    if got < size {
                        state.done = true;
                    }
                    if rows.is_empty() {
                        None
                    } else {
                        Some((Ok(rows), state))
                    }
                }
                Err(e) => {
                    state.done = true;
                    Some((Err(e), state))
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::QueryConfig;
    use crate::memory::MemoryDriver;
    use crate::token::{build, SortDirection};
    use crate::value::{row, Value};

    fn executor(rows: i64, chunk: u64) -> (Executor, MemoryDriver) {
        let driver = MemoryDriver::new().with_table(
            "numbers",
            (1..=rows).map(|i| row([("id", Value::from(i))])).collect(),
        );
        let config = QueryConfig {
            stream_chunk_size: chunk,
            ..Default::default()
        };
        (Executor::new(config, Arc::new(driver.clone())), driver)
    }

    fn ordered() -> Token {
        build::order(&Token::table("numbers"), "id", SortDirection::Asc).unwrap()
    }

    #[tokio::test]
    async fn test_stream_chunks() {
        let (exec, driver) = executor(10, 4);
        let chunks: Vec<_> = exec.stream(&ordered(), ExecOptions::new()).collect().await;
        let sizes: Vec<usize> = chunks.iter().map(|c| c.as_ref().unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(driver.query_count(), 3);
        assert_eq!(chunks[1].as_ref().unwrap()[0]["id"], Value::Integer(5));
    }

    #[tokio::test]
    async fn test_stream_respects_token_limit() {
        let (exec, _) = executor(10, 4);
        let t = build::limit(&ordered(), 6).unwrap();
        let rows: Vec<Row> = exec
            .stream(&t, ExecOptions::new())
            .map(|c| c.unwrap())
            .concat()
            .await;
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[5]["id"], Value::Integer(6));
    }

    #[tokio::test]
    async fn test_stream_exact_multiple_ends_on_empty_chunk() {
        let (exec, driver) = executor(8, 4);
        let chunks: Vec<_> = exec.stream(&ordered(), ExecOptions::new()).collect().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(driver.query_count(), 3);
    }

    #[tokio::test]
    async fn test_stream_error_ends_stream() {
        let (exec, _) = executor(1, 4);
        let chunks: Vec<_> = exec
            .stream(&Token::table("missing"), ExecOptions::new())
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_err());
    }
}
