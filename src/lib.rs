// 全局内存分配器：使用 jemalloc
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

// 分层结构：domain（撮合逻辑）→ application（市场与工作线程）→ interfaces（外部协作方）
pub mod domain;
pub mod application;
pub mod shared;
pub mod interfaces;
