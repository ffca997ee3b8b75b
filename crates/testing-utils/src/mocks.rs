//! 仓储接口的内存 Mock 实现

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use reconflow_domain::entities::{
    Asset, AssetDomainMapping, Domain, Page, ScanProfile, Task, TaskOutput, TaskStatus,
};
use reconflow_domain::repositories::{
    AssetRepository, DomainRepository, ScanProfileRepository, TaskOutputRepository,
    TaskRepository,
};
use reconflow_errors::{ReconError, ReconResult};

/// 扫描模板仓储 Mock
#[derive(Default)]
pub struct MockScanProfileRepository {
    profiles: Mutex<HashMap<i64, ScanProfile>>,
    next_id: Mutex<i64>,
}

impl MockScanProfileRepository {
    pub fn new() -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    pub fn with_profiles(profiles: Vec<ScanProfile>) -> Self {
        let mut map = HashMap::new();
        let mut max_id = 0;
        for profile in profiles {
            max_id = max_id.max(profile.id);
            map.insert(profile.id, profile);
        }
        Self {
            profiles: Mutex::new(map),
            next_id: Mutex::new(max_id + 1),
        }
    }
}

#[async_trait]
impl ScanProfileRepository for MockScanProfileRepository {
    async fn create(&self, profile: &ScanProfile) -> ReconResult<ScanProfile> {
        let mut profiles = self.profiles.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();
        let mut created = profile.clone();
        created.id = *next_id;
        *next_id += 1;
        profiles.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> ReconResult<Option<ScanProfile>> {
        Ok(self.profiles.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> ReconResult<Option<ScanProfile>> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list(&self, page: i64, page_size: i64) -> ReconResult<Page<ScanProfile>> {
        let profiles = self.profiles.lock().unwrap();
        let mut items: Vec<ScanProfile> = profiles.values().cloned().collect();
        items.sort_by_key(|p| p.id);
        Ok(Page {
            total: items.len() as i64,
            page,
            page_size,
            items,
        })
    }

    async fn update(&self, profile: &ScanProfile) -> ReconResult<ScanProfile> {
        let mut profiles = self.profiles.lock().unwrap();
        if !profiles.contains_key(&profile.id) {
            return Err(ReconError::ProfileNotFound { id: profile.id });
        }
        profiles.insert(profile.id, profile.clone());
        Ok(profile.clone())
    }

    async fn delete(&self, id: i64) -> ReconResult<bool> {
        Ok(self.profiles.lock().unwrap().remove(&id).is_some())
    }
}

/// 任务仓储 Mock
///
/// 任务表通过 `tasks_handle` 与输出仓储 Mock 共享，
/// 以支持扇入聚合查询的联表语义。
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<i64, Task>>>,
    next_id: Mutex<i64>,
}

impl Default for MockTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: Mutex::new(1),
        }
    }

    /// 任务表的共享句柄
    pub fn tasks_handle(&self) -> Arc<Mutex<HashMap<i64, Task>>> {
        self.tasks.clone()
    }

    pub fn all_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.lock().unwrap().values().cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub fn task(&self, id: i64) -> Option<Task> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, task: &Task) -> ReconResult<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();
        let mut created = task.clone();
        created.id = *next_id;
        *next_id += 1;
        created.created_at = Utc::now();
        created.updated_at = Utc::now();
        tasks.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> ReconResult<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, task: &Task) -> ReconResult<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.contains_key(&task.id) {
            return Err(ReconError::TaskNotFound { id: task.id });
        }
        tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn update_status(&self, id: i64, status: TaskStatus, result: &str) -> ReconResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&id)
            .ok_or(ReconError::TaskNotFound { id })?;
        task.status = status;
        task.result = result.to_string();
        if status.is_terminal() {
            task.finished_at = Some(Utc::now());
        }
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_parent_and_step(
        &self,
        parent_task_id: i64,
        workflow_step: &str,
    ) -> ReconResult<Option<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut matches: Vec<&Task> = tasks
            .values()
            .filter(|t| t.parent_task_id == parent_task_id && t.workflow_step == workflow_step)
            .collect();
        matches.sort_by_key(|t| t.id);
        Ok(matches.first().map(|t| (*t).clone()))
    }

    async fn set_pending_subtasks(&self, id: i64, count: i32) -> ReconResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&id)
            .ok_or(ReconError::TaskNotFound { id })?;
        task.pending_subtasks = count;
        Ok(())
    }

    async fn decrement_pending_subtasks(&self, id: i64) -> ReconResult<Option<i32>> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&id)
            .ok_or(ReconError::TaskNotFound { id })?;
        if task.pending_subtasks <= 0 {
            return Ok(None);
        }
        task.pending_subtasks -= 1;
        Ok(Some(task.pending_subtasks))
    }

    async fn list_top_level(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut items: Vec<Task> = tasks
            .values()
            .filter(|t| t.project_id == project_id && t.parent_task_id == 0)
            .cloned()
            .collect();
        items.sort_by_key(|t| t.id);
        Ok(Page {
            total: items.len() as i64,
            page,
            page_size,
            items,
        })
    }

    async fn find_children(&self, parent_task_id: i64) -> ReconResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut children: Vec<Task> = tasks
            .values()
            .filter(|t| t.parent_task_id == parent_task_id)
            .cloned()
            .collect();
        children.sort_by_key(|t| t.id);
        Ok(children)
    }
}

/// 任务输出仓储 Mock
pub struct MockTaskOutputRepository {
    outputs: Mutex<HashMap<i64, TaskOutput>>,
    tasks: Arc<Mutex<HashMap<i64, Task>>>,
    next_id: Mutex<i64>,
}

impl MockTaskOutputRepository {
    /// 与任务仓储 Mock 共享任务表
    pub fn new(tasks: Arc<Mutex<HashMap<i64, Task>>>) -> Self {
        Self {
            outputs: Mutex::new(HashMap::new()),
            tasks,
            next_id: Mutex::new(1),
        }
    }

    pub fn all_outputs(&self) -> Vec<TaskOutput> {
        let mut outputs: Vec<TaskOutput> =
            self.outputs.lock().unwrap().values().cloned().collect();
        outputs.sort_by_key(|o| o.id);
        outputs
    }

    pub fn remove_output(&self, task_id: i64) {
        self.outputs.lock().unwrap().remove(&task_id);
    }
}

#[async_trait]
impl TaskOutputRepository for MockTaskOutputRepository {
    async fn create(&self, output: &TaskOutput) -> ReconResult<TaskOutput> {
        let mut outputs = self.outputs.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();
        let mut created = output.clone();
        created.id = *next_id;
        *next_id += 1;
        created.created_at = Utc::now();
        outputs.insert(created.task_id, created.clone());
        Ok(created)
    }

    async fn find_by_task_id(&self, task_id: i64) -> ReconResult<Option<TaskOutput>> {
        Ok(self.outputs.lock().unwrap().get(&task_id).cloned())
    }

    async fn update_data(&self, task_id: i64, data: &serde_json::Value) -> ReconResult<()> {
        let mut outputs = self.outputs.lock().unwrap();
        let output = outputs
            .get_mut(&task_id)
            .ok_or(ReconError::TaskOutputNotFound { task_id })?;
        output.data = data.clone();
        Ok(())
    }

    async fn find_child_outputs(
        &self,
        parent_task_id: i64,
        workflow_step: &str,
    ) -> ReconResult<Vec<TaskOutput>> {
        let tasks = self.tasks.lock().unwrap();
        let child_ids: HashSet<i64> = tasks
            .values()
            .filter(|t| t.parent_task_id == parent_task_id && t.workflow_step == workflow_step)
            .map(|t| t.id)
            .collect();
        drop(tasks);

        let outputs = self.outputs.lock().unwrap();
        let mut result: Vec<TaskOutput> = outputs
            .values()
            .filter(|o| child_ids.contains(&o.task_id))
            .cloned()
            .collect();
        result.sort_by_key(|o| o.id);
        Ok(result)
    }
}

/// 域名仓储 Mock
#[derive(Default)]
pub struct MockDomainRepository {
    domains: Mutex<HashMap<(i64, String), Domain>>,
    next_id: Mutex<i64>,
}

impl MockDomainRepository {
    pub fn new() -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    pub fn all_domains(&self) -> Vec<Domain> {
        let mut domains: Vec<Domain> = self.domains.lock().unwrap().values().cloned().collect();
        domains.sort_by_key(|d| d.id);
        domains
    }
}

#[async_trait]
impl DomainRepository for MockDomainRepository {
    async fn upsert_many(&self, domains: &[Domain]) -> ReconResult<()> {
        let mut store = self.domains.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();
        for domain in domains {
            let key = (domain.project_id, domain.fqdn.clone());
            match store.get_mut(&key) {
                Some(existing) => {
                    existing.last_seen_at = domain.last_seen_at;
                }
                None => {
                    let mut created = domain.clone();
                    created.id = *next_id;
                    *next_id += 1;
                    store.insert(key, created);
                }
            }
        }
        Ok(())
    }

    async fn find_by_fqdns(&self, project_id: i64, fqdns: &[String]) -> ReconResult<Vec<Domain>> {
        let store = self.domains.lock().unwrap();
        let mut result: Vec<Domain> = fqdns
            .iter()
            .filter_map(|fqdn| store.get(&(project_id, fqdn.clone())).cloned())
            .collect();
        result.sort_by_key(|d| d.id);
        result.dedup_by_key(|d| d.id);
        Ok(result)
    }

    async fn list_by_project(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Domain>> {
        let store = self.domains.lock().unwrap();
        let mut items: Vec<Domain> = store
            .values()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect();
        items.sort_by_key(|d| d.id);
        Ok(Page {
            total: items.len() as i64,
            page,
            page_size,
            items,
        })
    }
}

/// 资产仓储 Mock
#[derive(Default)]
pub struct MockAssetRepository {
    assets: Mutex<HashMap<(i64, String, i32), Asset>>,
    mappings: Mutex<HashSet<(i64, i64)>>,
    next_id: Mutex<i64>,
}

impl MockAssetRepository {
    pub fn new() -> Self {
        Self {
            assets: Mutex::new(HashMap::new()),
            mappings: Mutex::new(HashSet::new()),
            next_id: Mutex::new(1),
        }
    }

    pub fn all_assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self.assets.lock().unwrap().values().cloned().collect();
        assets.sort_by_key(|a| a.id);
        assets
    }

    pub fn all_mappings(&self) -> Vec<(i64, i64)> {
        let mut mappings: Vec<(i64, i64)> =
            self.mappings.lock().unwrap().iter().copied().collect();
        mappings.sort();
        mappings
    }
}

#[async_trait]
impl AssetRepository for MockAssetRepository {
    async fn upsert_many(&self, assets: &[Asset]) -> ReconResult<()> {
        let mut store = self.assets.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();
        for asset in assets {
            let key = (asset.project_id, asset.ip.clone(), asset.port);
            match store.get_mut(&key) {
                Some(existing) => {
                    existing.last_seen_at = asset.last_seen_at;
                    existing.title = asset.title.clone();
                    existing.web_server = asset.web_server.clone();
                    existing.technologies = asset.technologies.clone();
                }
                None => {
                    let mut created = asset.clone();
                    created.id = *next_id;
                    *next_id += 1;
                    store.insert(key, created);
                }
            }
        }
        Ok(())
    }

    async fn find_by_ips(&self, project_id: i64, ips: &[String]) -> ReconResult<Vec<Asset>> {
        let store = self.assets.lock().unwrap();
        let mut result: Vec<Asset> = store
            .values()
            .filter(|a| a.project_id == project_id && ips.contains(&a.ip))
            .cloned()
            .collect();
        result.sort_by_key(|a| a.id);
        Ok(result)
    }

    async fn link_domains(&self, mappings: &[AssetDomainMapping]) -> ReconResult<()> {
        let mut store = self.mappings.lock().unwrap();
        for mapping in mappings {
            store.insert((mapping.asset_id, mapping.domain_id));
        }
        Ok(())
    }

    async fn list_by_project(
        &self,
        project_id: i64,
        page: i64,
        page_size: i64,
    ) -> ReconResult<Page<Asset>> {
        let store = self.assets.lock().unwrap();
        let mut items: Vec<Asset> = store
            .values()
            .filter(|a| a.project_id == project_id)
            .cloned()
            .collect();
        items.sort_by_key(|a| a.id);
        Ok(Page {
            total: items.len() as i64,
            page,
            page_size,
            items,
        })
    }
}
