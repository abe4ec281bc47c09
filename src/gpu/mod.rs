//! GPU-facing resource pools: the texture pool, the vertex upload ring
//! buffer, and the per-path index buffer cache. The mask group engine's
//! "mask texture cache" is not a separate structure — it is the general
//! `TexturePool` used for the bbox-sized accumulator/coverage/content
//! textures it acquires and releases each scope (see `crate::mask_engine`).

pub mod index_cache;
pub mod texture_pool;
pub mod vertex_pool;

pub use index_cache::PathIndexBufferCache;
pub use texture_pool::{PoolFormat, PooledTexture, ScopedTexture, TexturePool};
pub use vertex_pool::{UploadSlice, VertexUploadPool, DEFAULT_RING_DEPTH};
