use super::ServiceLifetime;
use std::sync::atomic::{AtomicU64, Ordering};

/// 内部统计（原子计数器）
#[derive(Default)]
pub(crate) struct InnerStats {
    total_resolutions: AtomicU64,
    cache_hits: AtomicU64,
    singleton_creations: AtomicU64,
    scoped_creations: AtomicU64,
    transient_creations: AtomicU64,
    circular_dependencies: AtomicU64,
}

impl InnerStats {
    pub fn record_resolution(&self) {
        self.total_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_creation(&self, lifetime: ServiceLifetime) {
        let counter = match lifetime {
            ServiceLifetime::Singleton => &self.singleton_creations,
            ServiceLifetime::Scoped => &self.scoped_creations,
            ServiceLifetime::Transient => &self.transient_creations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle(&self) {
        self.circular_dependencies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, registered_bindings: usize, cached_singletons: usize) -> ContainerStats {
        ContainerStats {
            total_resolutions: self.total_resolutions.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            singleton_creations: self.singleton_creations.load(Ordering::Relaxed),
            scoped_creations: self.scoped_creations.load(Ordering::Relaxed),
            transient_creations: self.transient_creations.load(Ordering::Relaxed),
            circular_dependencies: self.circular_dependencies.load(Ordering::Relaxed),
            registered_bindings,
            cached_singletons,
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total_resolutions,
            &self.cache_hits,
            &self.singleton_creations,
            &self.scoped_creations,
            &self.transient_creations,
            &self.circular_dependencies,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStats {
    /// 总解析次数（含依赖解析）
    pub total_resolutions: u64,
    /// 单例/作用域缓存命中次数
    pub cache_hits: u64,
    /// 单例创建次数
    pub singleton_creations: u64,
    /// 作用域实例创建次数
    pub scoped_creations: u64,
    /// 瞬态实例创建次数
    pub transient_creations: u64,
    /// 检测到的循环依赖次数
    pub circular_dependencies: u64,
    /// 已注册绑定数量
    pub registered_bindings: usize,
    /// 根作用域中缓存的实例数量
    pub cached_singletons: usize,
}

impl ContainerStats {
    /// 缓存命中率（小数形式）
    pub fn hit_rate(&self) -> f64 {
        let cacheable = self.cache_hits + self.singleton_creations + self.scoped_creations;
        if cacheable == 0 {
            0.0
        } else {
            self.cache_hits as f64 / cacheable as f64
        }
    }

    /// 获取服务创建分布 (singleton, scoped, transient)
    pub fn creation_distribution(&self) -> (u64, u64, u64) {
        (
            self.singleton_creations,
            self.scoped_creations,
            self.transient_creations,
        )
    }

    /// 获取性能指标摘要
    pub fn performance_summary(&self) -> String {
        format!(
            "Container Performance: {} total resolutions, {:.1}% cache hit rate, {} registered bindings, {} cached singletons",
            self.total_resolutions,
            self.hit_rate() * 100.0,
            self.registered_bindings,
            self.cached_singletons
        )
    }
}
