use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{Course, Error, Result, Schedule};

/// 按键存取字节的存储后端
#[async_trait]
pub trait KeyedStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put_raw(&self, key: &str, value: &[u8]) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

#[async_trait]
pub trait Store: KeyedStore {
    async fn put<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Send + Sync,
    {
        let value_bytes = serde_json::to_vec(value)?;
        self.put_raw(key, &value_bytes).await
    }

    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        if let Some(raw) = self.get_raw(key).await? {
            let value = serde_json::from_slice::<T>(&raw)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }
}

/// 为所有实现了 KeyedStore 的类型自动实现 Store
impl<T: KeyedStore> Store for T {}

#[async_trait]
impl<T: KeyedStore + ?Sized> KeyedStore for Arc<T> {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get_raw(key).await
    }

    async fn put_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put_raw(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key).await
    }
}

/// 进程内存储，用于测试和一次性运行
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }
}

const INDEX_KEY: &str = "schedules";

/// 课表仓库，负责课表生命周期：同一时间只有一个激活课表，删除课表时一并删除课程
#[derive(Clone)]
pub struct ScheduleRepository<S: KeyedStore> {
    store: S,
}

impl<S: KeyedStore> ScheduleRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn schedule_key(id: Uuid) -> String {
        format!("schedule:{id}")
    }

    pub fn courses_key(id: Uuid) -> String {
        format!("courses:{id}")
    }

    async fn index(&self) -> Result<Vec<Uuid>> {
        Ok(self.store.get(INDEX_KEY).await?.unwrap_or_default())
    }

    /// 保存课表及其全部课程，已存在的同 id 课表整体替换
    ///
    /// 保存一个激活课表会使其他课表失效。
    pub async fn save(&self, schedule: &Schedule, courses: &[Course]) -> Result<()> {
        if let Some(course) = courses.iter().find(|c| c.schedule_id != schedule.id) {
            return Err(Error::validation(
                "schedule_id",
                format!(
                    "course '{}' belongs to {}, not {}",
                    course.name, course.schedule_id, schedule.id
                ),
            ));
        }

        let mut index = self.index().await?;
        if !index.contains(&schedule.id) {
            index.push(schedule.id);
        }

        self.store
            .put(&Self::courses_key(schedule.id), &courses)
            .await?;
        self.store
            .put(&Self::schedule_key(schedule.id), schedule)
            .await?;
        self.store.put(INDEX_KEY, &index).await?;

        if schedule.is_active {
            self.deactivate_others(schedule.id).await?;
        }

        tracing::debug!(schedule = %schedule.id, courses = courses.len(), "saved schedule");
        Ok(())
    }

    pub async fn schedule(&self, id: Uuid) -> Result<Schedule> {
        self.store
            .get(&Self::schedule_key(id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("schedule {id}")))
    }

    pub async fn courses(&self, id: Uuid) -> Result<Vec<Course>> {
        Ok(self
            .store
            .get(&Self::courses_key(id))
            .await?
            .unwrap_or_default())
    }

    /// 读取课表及其课程
    pub async fn load(&self, id: Uuid) -> Result<(Schedule, Vec<Course>)> {
        let schedule = self.schedule(id).await?;
        let courses = self.courses(id).await?;
        Ok((schedule, courses))
    }

    /// 全部课表，按创建时间排序
    pub async fn list(&self) -> Result<Vec<Schedule>> {
        let mut schedules = Vec::new();
        for id in self.index().await? {
            match self.store.get::<Schedule>(&Self::schedule_key(id)).await? {
                Some(schedule) => schedules.push(schedule),
                None => tracing::warn!(schedule = %id, "index entry without schedule"),
            }
        }
        schedules.sort_by_key(|s| (s.created_at, s.id));
        Ok(schedules)
    }

    pub async fn active(&self) -> Result<Option<Schedule>> {
        Ok(self.list().await?.into_iter().find(|s| s.is_active))
    }

    /// 激活课表，其余课表全部失效
    pub async fn activate(&self, id: Uuid) -> Result<Schedule> {
        let mut schedule = self.schedule(id).await?;
        if !schedule.is_active {
            schedule.is_active = true;
            self.store.put(&Self::schedule_key(id), &schedule).await?;
        }
        self.deactivate_others(id).await?;
        tracing::info!(schedule = %id, name = %schedule.name, "activated schedule");
        Ok(schedule)
    }

    /// 删除课表和它的全部课程
    pub async fn delete(&self, id: Uuid) -> Result<Schedule> {
        let schedule = self.schedule(id).await?;

        self.store.delete(&Self::courses_key(id)).await?;
        self.store.delete(&Self::schedule_key(id)).await?;
        let mut index = self.index().await?;
        index.retain(|entry| *entry != id);
        self.store.put(INDEX_KEY, &index).await?;

        tracing::info!(schedule = %id, name = %schedule.name, "deleted schedule");
        Ok(schedule)
    }

    async fn deactivate_others(&self, id: Uuid) -> Result<()> {
        for mut other in self.list().await? {
            if other.id != id && other.is_active {
                other.is_active = false;
                self.store
                    .put(&Self::schedule_key(other.id), &other)
                    .await?;
            }
        }
        Ok(())
    }
}
