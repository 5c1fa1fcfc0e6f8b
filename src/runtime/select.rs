//! # Select
//!
//! 同时等待多个异步操作，返回第一个完成的结果。
//!
//! ## 语义
//!
//! - 每次轮询按分支顺序进行，第一个就绪的分支获胜
//! - 返回结果之前，其余分支在原地被丢弃：挂在等待列表上的分支随之脱链，
//!   不会在之后被"半恢复"
//! - 分支不要求 `Unpin`，它们随 Select 一起固定
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use neon_coro::select;
//!
//! // 带超时的接收
//! let received = select! {
//!     frame = rx_done.wait(Frame::default()) => Some(frame),
//!     _ = timers.sleep_until(now + TIMEOUT) => None,
//! };
//! ```

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

/// 轮询一个分支
///
/// # Safety
/// `slot` 必须位于已固定的 Select 内部，且其中的 future 只会被原地丢弃。
unsafe fn poll_branch<F: Future>(slot: &mut Option<F>, cx: &mut Context<'_>) -> Poll<F::Output> {
    match slot.as_mut() {
        Some(future) => unsafe { Pin::new_unchecked(future) }.poll(cx),
        None => Poll::Pending,
    }
}

/// 两个 Future 的选择器
pub struct Select2<A, B> {
    a: Option<A>,
    b: Option<B>,
}

impl<A, B> Select2<A, B> {
    pub fn new(a: A, b: B) -> Self {
        Self {
            a: Some(a),
            b: Some(b),
        }
    }

    fn drop_all(&mut self) {
        self.a = None;
        self.b = None;
    }
}

/// Select2 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Either<A, B> {
    /// 第一个 Future 完成
    First(A),
    /// 第二个 Future 完成
    Second(B),
}

impl<A, B> Either<A, B> {
    /// 获胜分支的序号，从 1 开始
    pub fn index(&self) -> usize {
        match self {
            Either::First(_) => 1,
            Either::Second(_) => 2,
        }
    }
}

impl<A: Future, B: Future> Future for Select2<A, B> {
    type Output = Either<A::Output, B::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: 分支只会被原地丢弃，不会被移出
        let this = unsafe { self.get_unchecked_mut() };

        let result = if let Poll::Ready(r) = unsafe { poll_branch(&mut this.a, cx) } {
            Either::First(r)
        } else if let Poll::Ready(r) = unsafe { poll_branch(&mut this.b, cx) } {
            Either::Second(r)
        } else {
            return Poll::Pending;
        };
        this.drop_all();
        Poll::Ready(result)
    }
}

/// 三个 Future 的选择器
pub struct Select3<A, B, C> {
    a: Option<A>,
    b: Option<B>,
    c: Option<C>,
}

impl<A, B, C> Select3<A, B, C> {
    pub fn new(a: A, b: B, c: C) -> Self {
        Self {
            a: Some(a),
            b: Some(b),
            c: Some(c),
        }
    }

    fn drop_all(&mut self) {
        self.a = None;
        self.b = None;
        self.c = None;
    }
}

/// Select3 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Either3<A, B, C> {
    First(A),
    Second(B),
    Third(C),
}

impl<A, B, C> Either3<A, B, C> {
    pub fn index(&self) -> usize {
        match self {
            Either3::First(_) => 1,
            Either3::Second(_) => 2,
            Either3::Third(_) => 3,
        }
    }
}

impl<A: Future, B: Future, C: Future> Future for Select3<A, B, C> {
    type Output = Either3<A::Output, B::Output, C::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };

        let result = if let Poll::Ready(r) = unsafe { poll_branch(&mut this.a, cx) } {
            Either3::First(r)
        } else if let Poll::Ready(r) = unsafe { poll_branch(&mut this.b, cx) } {
            Either3::Second(r)
        } else if let Poll::Ready(r) = unsafe { poll_branch(&mut this.c, cx) } {
            Either3::Third(r)
        } else {
            return Poll::Pending;
        };
        this.drop_all();
        Poll::Ready(result)
    }
}

/// 四个 Future 的选择器
pub struct Select4<A, B, C, D> {
    a: Option<A>,
    b: Option<B>,
    c: Option<C>,
    d: Option<D>,
}

impl<A, B, C, D> Select4<A, B, C, D> {
    pub fn new(a: A, b: B, c: C, d: D) -> Self {
        Self {
            a: Some(a),
            b: Some(b),
            c: Some(c),
            d: Some(d),
        }
    }

    fn drop_all(&mut self) {
        self.a = None;
        self.b = None;
        self.c = None;
        self.d = None;
    }
}

/// Select4 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Either4<A, B, C, D> {
    First(A),
    Second(B),
    Third(C),
    Fourth(D),
}

impl<A, B, C, D> Either4<A, B, C, D> {
    pub fn index(&self) -> usize {
        match self {
            Either4::First(_) => 1,
            Either4::Second(_) => 2,
            Either4::Third(_) => 3,
            Either4::Fourth(_) => 4,
        }
    }
}

impl<A: Future, B: Future, C: Future, D: Future> Future for Select4<A, B, C, D> {
    type Output = Either4<A::Output, B::Output, C::Output, D::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };

        let result = if let Poll::Ready(r) = unsafe { poll_branch(&mut this.a, cx) } {
            Either4::First(r)
        } else if let Poll::Ready(r) = unsafe { poll_branch(&mut this.b, cx) } {
            Either4::Second(r)
        } else if let Poll::Ready(r) = unsafe { poll_branch(&mut this.c, cx) } {
            Either4::Third(r)
        } else if let Poll::Ready(r) = unsafe { poll_branch(&mut this.d, cx) } {
            Either4::Fourth(r)
        } else {
            return Poll::Pending;
        };
        this.drop_all();
        Poll::Ready(result)
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

/// 选择两个 Future 中第一个完成的
pub fn select2<A: Future, B: Future>(a: A, b: B) -> Select2<A, B> {
    Select2::new(a, b)
}

/// 选择三个 Future 中第一个完成的
pub fn select3<A: Future, B: Future, C: Future>(a: A, b: B, c: C) -> Select3<A, B, C> {
    Select3::new(a, b, c)
}

/// 选择四个 Future 中第一个完成的
pub fn select4<A: Future, B: Future, C: Future, D: Future>(a: A, b: B, c: C, d: D) -> Select4<A, B, C, D> {
    Select4::new(a, b, c, d)
}

// ============================================================================
// Select 宏
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __select_future {
    // 最后一个 Future
    ($pat:pat = $fut:expr => $expr:expr $(,)?) => {
        $fut
    };
    // 构建 Select2 链
    ($pat:pat = $fut:expr => $expr:expr, $($rest:tt)+) => {
        $crate::runtime::select::select2($fut, $crate::__select_future!($($rest)+))
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __select_match {
    ($val:ident, $pat:pat = $fut:expr => $expr:expr $(,)?) => {{
        let $pat = $val;
        $expr
    }};
    ($val:ident, $pat:pat = $fut:expr => $expr:expr, $($rest:tt)+) => {
        match $val {
            $crate::runtime::select::Either::First($pat) => $expr,
            $crate::runtime::select::Either::Second(next_val) => {
                $crate::__select_match!(next_val, $($rest)+)
            }
        }
    };
}

/// 同时等待多个异步操作，执行第一个完成的分支
///
/// ```rust,ignore
/// select! {
///     pattern1 = future1 => expression1,
///     pattern2 = future2 => expression2,
///     ...
/// }
/// ```
///
/// 分支按顺序检查，多个同时就绪时前面的获胜；其余分支在执行表达式之前已被丢弃。
#[macro_export]
macro_rules! select {
    ($pat:pat = $fut:expr => $expr:expr $(,)?) => {{
        let $pat = $fut.await;
        $expr
    }};
    ($($args:tt)+) => {{
        let result = $crate::__select_future!($($args)+).await;
        $crate::__select_match!(result, $($args)+)
    }};
}
