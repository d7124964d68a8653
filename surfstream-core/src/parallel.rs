//! Fork-join helpers for the codec's data-parallel passes.
//!
//! Work is split into fixed-size chunks (frame rows, bit groups) and
//! the chunks are dealt out in contiguous bands to scoped worker
//! threads. Threads live only for the duration of one call.

use std::thread;

/// Below this many bytes the call runs on the current thread.
const MIN_PARALLEL_LEN: usize = 16 * 1024;

fn worker_count() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Split `data` into `chunk_len`-sized chunks and map each one, in
/// parallel, to a result. Results come back in chunk order; `f`
/// receives the chunk index and the chunk.
pub fn map_chunks<R, F>(data: &[u8], chunk_len: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize, &[u8]) -> R + Sync,
{
    let chunk_len = chunk_len.max(1);
    let chunks = data.len().div_ceil(chunk_len);
    let workers = worker_count().min(chunks);

    if workers <= 1 || data.len() < MIN_PARALLEL_LEN {
        return data.chunks(chunk_len).enumerate().map(|(i, c)| f(i, c)).collect();
    }

    let per_worker = chunks.div_ceil(workers);
    thread::scope(|s| {
        let handles: Vec<_> = data
            .chunks(per_worker * chunk_len)
            .enumerate()
            .map(|(w, band)| {
                let f = &f;
                s.spawn(move || {
                    band.chunks(chunk_len)
                        .enumerate()
                        .map(|(j, c)| f(w * per_worker + j, c))
                        .collect::<Vec<R>>()
                })
            })
            .collect();

        let mut out = Vec::with_capacity(chunks);
        for handle in handles {
            match handle.join() {
                Ok(part) => out.extend(part),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        out
    })
}

/// Mutable counterpart of [`map_chunks`].
pub fn map_chunks_mut<R, F>(data: &mut [u8], chunk_len: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize, &mut [u8]) -> R + Sync,
{
    let chunk_len = chunk_len.max(1);
    let chunks = data.len().div_ceil(chunk_len);
    let workers = worker_count().min(chunks);

    if workers <= 1 || data.len() < MIN_PARALLEL_LEN {
        return data
            .chunks_mut(chunk_len)
            .enumerate()
            .map(|(i, c)| f(i, c))
            .collect();
    }

    let per_worker = chunks.div_ceil(workers);
    thread::scope(|s| {
        let handles: Vec<_> = data
            .chunks_mut(per_worker * chunk_len)
            .enumerate()
            .map(|(w, band)| {
                let f = &f;
                s.spawn(move || {
                    band.chunks_mut(chunk_len)
                        .enumerate()
                        .map(|(j, c)| f(w * per_worker + j, c))
                        .collect::<Vec<R>>()
                })
            })
            .collect();

        let mut out = Vec::with_capacity(chunks);
        for handle in handles {
            match handle.join() {
                Ok(part) => out.extend(part),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        out
    })
}

/// Run `f` over every `chunk_len`-sized chunk of `data` in parallel.
pub fn for_each_chunk_mut<F>(data: &mut [u8], chunk_len: usize, f: F)
where
    F: Fn(usize, &mut [u8]) + Sync,
{
    map_chunks_mut(data, chunk_len, f);
}
