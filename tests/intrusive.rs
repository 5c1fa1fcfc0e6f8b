use core::pin::pin;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::collections::VecDeque;
use std::thread;

use neon_coro::intrusive::{
    HasQueueNode, InterruptQueue, IntrusiveMpscQueue, IntrusiveQueue, PopResult, QueueNode, RemoveResult,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PRODUCERS: usize = 3;
const MESSAGES: usize = 10_000;
const POOL: usize = 4;

/// 在生产者之间复用的消息
struct Message {
    node: QueueNode,
    producer: usize,
    seq: AtomicUsize,
    /// 消费者读取完毕，可以再次入队
    free: AtomicBool,
}

unsafe impl HasQueueNode for Message {
    fn queue_node(&self) -> &QueueNode {
        &self.node
    }
}

#[test]
fn test_mpsc_stress_reused_nodes() {
    let pools: Vec<Vec<Message>> = (0..PRODUCERS)
        .map(|producer| {
            (0..POOL)
                .map(|_| Message {
                    node: QueueNode::new(),
                    producer,
                    seq: AtomicUsize::new(0),
                    free: AtomicBool::new(true),
                })
                .collect()
        })
        .collect();
    let queue = pin!(IntrusiveMpscQueue::<Message>::new());
    let queue = queue.into_ref();

    thread::scope(|s| {
        for pool in &pools {
            s.spawn(move || {
                for seq in 0..MESSAGES {
                    let message = &pool[seq % POOL];
                    while !message.free.load(Ordering::Acquire) {
                        thread::yield_now();
                    }
                    message.free.store(false, Ordering::Relaxed);
                    message.seq.store(seq, Ordering::Relaxed);
                    queue.push(message);
                }
            });
        }

        let mut next = [0usize; PRODUCERS];
        let mut received = 0;
        while received < PRODUCERS * MESSAGES {
            let Some(message) = queue.pop() else {
                thread::yield_now();
                continue;
            };
            let seq = message.seq.load(Ordering::Relaxed);
            // 同一生产者的消息保持先后顺序
            assert_eq!(seq, next[message.producer]);
            next[message.producer] += 1;
            received += 1;
            message.free.store(true, Ordering::Release);
        }
        assert_eq!(next, [MESSAGES; PRODUCERS]);
    });

    assert!(queue.pop().is_none());
    assert!(queue.is_empty());
}

/// 中断处理的传输请求
struct Request {
    node: QueueNode,
    id: usize,
    done: AtomicBool,
}

unsafe impl HasQueueNode for Request {
    fn queue_node(&self) -> &QueueNode {
        &self.node
    }
}

fn request(id: usize) -> Request {
    Request {
        node: QueueNode::new(),
        id,
        done: AtomicBool::new(false),
    }
}

#[test]
fn test_interrupt_queue_codes() {
    let requests: Vec<Request> = (0..3).map(request).collect();
    let queue: InterruptQueue<Request> = InterruptQueue::new();

    assert_eq!(queue.pop_if(|_| true), PopResult::Empty);
    assert_eq!(queue.remove(&requests[0], true), RemoveResult::NotFound);

    for r in &requests {
        queue.push(r);
    }
    // 中断正在处理队首请求，主循环不能撤回它
    assert_eq!(queue.remove(&requests[0], false).code(), 0);
    assert_eq!(queue.remove(&requests[2], false).code(), 1);
    assert_eq!(queue.remove(&requests[2], false).code(), -1);

    let started = AtomicUsize::new(usize::MAX);
    let result = queue.remove_with(
        &requests[0],
        |front| !front.done.load(Ordering::Relaxed),
        |next| started.store(next.id, Ordering::Relaxed),
    );
    assert_eq!(result, RemoveResult::Removed);
    assert_eq!(started.load(Ordering::Relaxed), 1);

    assert_eq!(queue.pop_if_then(|_| true, |_| unreachable!()).code(), 1);
    assert_eq!(queue.pop_if(|_| false).code(), -1);
    assert!(queue.is_empty());
}

#[test]
fn test_interrupt_queue_with_critical_section() {
    const REQUESTS: usize = 256;
    let requests: Vec<Request> = (0..REQUESTS).map(request).collect();
    let queue: InterruptQueue<Request> = InterruptQueue::new();

    thread::scope(|s| {
        // 模拟中断：逐个完成队首请求
        let isr = s.spawn(|| {
            let mut completed = Vec::with_capacity(REQUESTS);
            while completed.len() < REQUESTS {
                critical_section::with(|_cs| {
                    let result = queue.pop_if(|r| {
                        r.done.store(true, Ordering::Release);
                        completed.push(r.id);
                        true
                    });
                    assert_ne!(result, PopResult::Rejected);
                });
                thread::yield_now();
            }
            completed
        });

        for r in &requests {
            critical_section::with(|cs| queue.push_guarded(&cs, r));
        }

        let completed = match isr.join() {
            Ok(completed) => completed,
            Err(_) => panic!("中断线程异常退出"),
        };
        assert_eq!(completed, (0..REQUESTS).collect::<Vec<_>>());
    });

    assert!(requests.iter().all(|r| r.done.load(Ordering::Acquire)));
    assert!(queue.is_empty());
}

struct Item {
    node: QueueNode,
    id: usize,
}

unsafe impl HasQueueNode for Item {
    fn queue_node(&self) -> &QueueNode {
        &self.node
    }
}

fn items(n: usize) -> Vec<Item> {
    (0..n).map(|id| Item { node: QueueNode::new(), id }).collect()
}

fn remove_from(model: &mut VecDeque<usize>, id: usize) -> bool {
    match model.iter().position(|&x| x == id) {
        Some(pos) => {
            model.remove(pos);
            true
        }
        None => false,
    }
}

#[test]
fn test_queue_against_model() {
    let items = items(16);
    let queue: IntrusiveQueue<Item> = IntrusiveQueue::new();
    let mut model = VecDeque::new();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..5_000 {
        let item = &items[rng.random_range(0..items.len())];
        match rng.random_range(0..4) {
            0 | 1 => {
                if !item.node.is_queued() {
                    assert_eq!(queue.push(item), model.is_empty());
                    model.push_back(item.id);
                }
            }
            2 => assert_eq!(queue.pop().map(|i| i.id), model.pop_front()),
            _ => assert_eq!(queue.remove(item), remove_from(&mut model, item.id)),
        }
        assert_eq!(queue.len(), model.len());
        assert_eq!(queue.front().map(|i| i.id), model.front().copied());
        assert_eq!(queue.back().map(|i| i.id), model.back().copied());
        assert_eq!(queue.contains(item), model.contains(&item.id));
    }
    queue.clear();
    assert!(items.iter().all(|i| !i.node.is_queued()));
}

#[test]
fn test_interrupt_queue_against_model() {
    let items = items(16);
    let queue: InterruptQueue<Item> = InterruptQueue::new();
    let mut model: VecDeque<usize> = VecDeque::new();
    let mut rng = StdRng::seed_from_u64(0xc0de);

    for _ in 0..5_000 {
        let item = &items[rng.random_range(0..items.len())];
        match rng.random_range(0..5) {
            0 | 1 => {
                if !item.node.is_queued() {
                    assert_eq!(queue.push(item), model.is_empty());
                    model.push_back(item.id);
                }
            }
            2 => {
                let accept = rng.random_bool(0.5);
                let expected = match model.front() {
                    None => PopResult::Empty,
                    Some(_) if !accept => PopResult::Rejected,
                    Some(_) => {
                        model.pop_front();
                        PopResult::Popped
                    }
                };
                assert_eq!(queue.pop_if(|_| accept), expected);
            }
            3 => {
                let remove_front = rng.random_bool(0.5);
                let expected = match model.iter().position(|&x| x == item.id) {
                    None => RemoveResult::NotFound,
                    Some(0) if !remove_front => RemoveResult::Rejected,
                    Some(pos) => {
                        model.remove(pos);
                        RemoveResult::Removed
                    }
                };
                assert_eq!(queue.remove(item, remove_front), expected);
            }
            _ => {
                let target = item.id;
                let expected = remove_from(&mut model, target);
                assert_eq!(queue.remove_if(|i| i.id == target), expected);
            }
        }
        assert_eq!(queue.is_empty(), model.is_empty());
        assert_eq!(queue.is_empty_or_one(), model.len() <= 1);
        assert_eq!(queue.front().map(|i| i.id), model.front().copied());
        assert_eq!(queue.back().map(|i| i.id), model.back().copied());
    }
    queue.clear();
    assert!(items.iter().all(|i| !i.node.is_queued()));
}
