//! 锁原语。
//!
//! # 教案式导览
//! - **意图 (Why)**：共享资源（对象池自由链表、连接记录）的锁策略应在构造时按资源特性选定，
//!   调用点只面对统一的 [`RawLock`] 抽象与作用域守卫，避免逐个调用点手工挑选锁类型；
//! - **逻辑 (How)**：
//!   - [`CriticalSection`]：阻塞互斥，可选先自旋若干次再挂起，适合持有时间不可预测的区段；
//!   - [`SpinLock`]：CAS 标志位忙等，按 [`yield_thread`] 规则逐级退让，不可重入；
//!   - [`ReentrantSpinLock`]：记录持有线程与重入深度，同线程可重复获取；
//!   - [`ReentrantCriticalSection`]：同样可重入，但竞争者经 [`CriticalSection`] 挂起而非忙等，
//!     适合持锁期间回调用户代码的区段；
//!   - [`NoopLock`]：永远成功，类型上不实现 `Sync`，只能用于单线程独占的资源；
//!   - [`PolicyLock`]：按 [`LockPolicy`] 在运行期选择上述三种真实锁之一；
//!   - [`ScopedLock`] / [`ScopedTryLock`]：构造即加锁、析构即解锁；
//!   - [`Locked`]：把数据与排他锁绑定，守卫解引用得到 `&mut T`。
//! - **契约 (What)**：`RawLock::unlock` 为 `unsafe`，只允许持有者调用；
//!   只有实现 [`ExclusiveLock`] 的锁才能用于 [`Locked`]，可重入锁与空锁不能提供 `&mut` 独占性。

mod critical_section;
mod guard;
mod locked;
mod noop;
mod policy;
mod raw;
mod reentrant;
mod spin;

pub use critical_section::CriticalSection;
pub use guard::{ScopedLock, ScopedTryLock};
pub use locked::{Locked, LockedGuard};
pub use noop::NoopLock;
pub use policy::{LockPolicy, PolicyLock};
pub use raw::{ExclusiveLock, RawLock};
pub use reentrant::{ReentrantCriticalSection, ReentrantSpinLock};
pub use spin::{SpinLock, yield_thread};
