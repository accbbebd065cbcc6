//! 60槽秒级时间轮
//!
//! 调度循环写入、秒级ticker取出。槽位内容只会被取出一次。

use std::collections::HashMap;
use std::sync::Mutex;

pub const WHEEL_SLOTS: u32 = 60;

#[derive(Debug, Default)]
pub struct TimeWheel {
    slots: Mutex<HashMap<u32, Vec<i64>>>,
}

impl TimeWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 毫秒时间戳对应的槽位
    pub fn slot_of(millis: i64) -> u32 {
        ((millis / 1000).rem_euclid(WHEEL_SLOTS as i64)) as u32
    }

    pub fn push(&self, slot: u32, job_id: i64) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(slot % WHEEL_SLOTS).or_default().push(job_id);
    }

    /// 取出 `(last, now]` 之间所有槽位的任务，最多走一整圈
    pub fn take_due(&self, last_second: u32, now_second: u32) -> Vec<i64> {
        if last_second == now_second {
            return Vec::new();
        }
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut due = Vec::new();
        for step in 1..=WHEEL_SLOTS {
            let slot = (last_second + step) % WHEEL_SLOTS;
            if let Some(job_ids) = slots.remove(&slot) {
                due.extend(job_ids);
            }
            if slot == now_second {
                break;
            }
        }
        due
    }

    /// 取出全部剩余任务
    pub fn drain_all(&self) -> Vec<i64> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<u32> = slots.keys().copied().collect();
        keys.sort_unstable();
        keys.into_iter()
            .filter_map(|k| slots.remove(&k))
            .flatten()
            .collect()
    }

    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ticker 每次额外回看的已走过槽位数
///
/// 调度循环可能在ticker走过当前秒之后才写入该槽位，回看保证这类任务在下一秒触发。
/// 预读窗口只有10秒，回看的槽位不会与一圈之后的任务混淆。
pub const RING_LOOKBACK: u32 = 2;

/// ticker 的游标
#[derive(Debug, Default)]
pub struct RingCursor {
    last_second: Option<u32>,
}

impl RingCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, wheel: &TimeWheel, now_second: u32) -> Vec<i64> {
        let last = self
            .last_second
            .unwrap_or((now_second + WHEEL_SLOTS - 1) % WHEEL_SLOTS);
        self.last_second = Some(now_second);
        let start = (last + WHEEL_SLOTS - RING_LOOKBACK) % WHEEL_SLOTS;
        wheel.take_due(start, now_second)
    }
}
