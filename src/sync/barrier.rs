//! # 屏障
//!
//! 协程在屏障处等待，直到被恢复方放行。与 [`WaitList`] 相同，
//! 每个等待者带有参数 `P`，放行时可以按参数挑选。

use core::pin::Pin;

use super::wait_list::{Wait, WaitList};

/// 带参数的屏障
pub struct Barrier<P = ()> {
    waiters: WaitList<P>,
}

impl<P> Barrier<P> {
    pub const fn new() -> Self {
        Self {
            waiters: WaitList::new(),
        }
    }

    /// 在屏障处等待，放行后产出参数
    pub fn wait(self: Pin<&Self>, params: P) -> Wait<'_, P> {
        // SAFETY: 结构投影，waiters 随 Barrier 一起固定
        let waiters = unsafe { self.map_unchecked(|b| &b.waiters) };
        waiters.wait(params)
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// 放行最早的等待者
    pub fn do_first(&self) -> bool {
        self.waiters.do_first()
    }

    /// 放行全部等待者
    pub fn do_all(&self) -> usize {
        self.waiters.do_all()
    }

    /// 放行第一个参数满足谓词的等待者
    pub fn do_first_if(&self, predicate: impl FnMut(&mut P) -> bool) -> bool {
        self.waiters.do_first_if(predicate)
    }

    /// 放行所有参数满足谓词的等待者
    pub fn do_all_if(&self, predicate: impl FnMut(&mut P) -> bool) -> usize {
        self.waiters.do_all_if(predicate)
    }

    pub fn visit_all(&self, visitor: impl FnMut(&P)) {
        self.waiters.visit_all(visitor)
    }
}

impl<P> Default for Barrier<P> {
    fn default() -> Self {
        Self::new()
    }
}
