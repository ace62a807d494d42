//! 관찰 가능한 태스크 상태 저장소
//!
//! 업로더가 상태 전이를 발행하고, 표시 계층은 스냅샷을 읽거나 구독한다.
//! 태스크당 쓰는 쪽은 하나(그 태스크의 업로더)뿐이다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::task::TaskSnapshot;

/// 구독 채널 용량
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// 저장소 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// 상태 갱신
    Updated(TaskSnapshot),
    /// 초기화되어 제거됨
    Removed(String),
}

struct StoreInner {
    tasks: DashMap<String, TaskSnapshot>,
    /// 등록 세대 (같은 ID를 다시 등록하면 바뀜)
    generations: DashMap<String, u64>,
    next_generation: AtomicU64,
    events: broadcast::Sender<TaskEvent>,
}

/// 태스크 상태 저장소 (복제해도 같은 저장소를 가리킴)
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<StoreInner>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                tasks: DashMap::new(),
                generations: DashMap::new(),
                next_generation: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// 새 태스크 등록 (같은 ID가 있으면 덮어씀), 새 세대 반환
    pub fn register(&self, snapshot: TaskSnapshot) -> u64 {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        self.inner
            .generations
            .insert(snapshot.file_id.clone(), generation);
        self.publish(snapshot);
        generation
    }

    /// 상태 발행
    ///
    /// 등록되지 않은 ID면 새 세대를 붙인다.
    pub fn publish(&self, snapshot: TaskSnapshot) {
        self.inner
            .generations
            .entry(snapshot.file_id.clone())
            .or_insert_with(|| self.inner.next_generation.fetch_add(1, Ordering::Relaxed));
        self.inner
            .tasks
            .insert(snapshot.file_id.clone(), snapshot.clone());
        // 구독자가 없으면 무시
        let _ = self.inner.events.send(TaskEvent::Updated(snapshot));
    }

    /// 스냅샷 조회
    pub fn snapshot(&self, file_id: &str) -> Option<TaskSnapshot> {
        self.inner.tasks.get(file_id).map(|s| s.clone())
    }

    /// 전체 스냅샷 (file_id 순)
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        let mut all: Vec<_> = self.inner.tasks.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.file_id.cmp(&b.file_id));
        all
    }

    /// 현재 등록 세대
    pub fn generation(&self, file_id: &str) -> Option<u64> {
        self.inner.generations.get(file_id).map(|g| *g)
    }

    /// 구독
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// 태스크 초기화 (표시 종료 후 제거)
    pub fn reset(&self, file_id: &str) -> bool {
        self.inner.generations.remove(file_id);
        let removed = self.inner.tasks.remove(file_id).is_some();
        if removed {
            let _ = self.inner.events.send(TaskEvent::Removed(file_id.to_string()));
        }
        removed
    }

    /// 세대가 같을 때만 초기화
    ///
    /// 그 사이 같은 ID가 다시 등록됐으면 아무것도 하지 않는다.
    pub fn reset_if_generation(&self, file_id: &str, generation: u64) -> bool {
        if self.generation(file_id) != Some(generation) {
            return false;
        }
        self.reset(file_id)
    }

    /// 전체 초기화 (새 배치 시작 전)
    pub fn clear(&self) {
        let ids: Vec<String> = self.inner.tasks.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.reset(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.is_empty()
    }
}
