use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{CredentialStore, StudentStore};
use crate::models::{Document, StudentRecord, UserCredential};

/// Process-local store for development and tests. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<Vec<StoredUser>>,
    students: RwLock<Vec<StudentRecord>>,
}

struct StoredUser {
    credential: UserCredential,
    profile: Document,
}

impl StoredUser {
    fn new(username: &str, password_hash: &str, profile: &Document) -> Self {
        Self {
            credential: UserCredential {
                id: Uuid::new_v4(),
                username: username.to_string(),
                password_hash: password_hash.to_string(),
            },
            profile: profile.clone(),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        profile: &Document,
    ) -> anyhow::Result<Uuid> {
        let user = StoredUser::new(username, password_hash, profile);
        let id = user.credential.id;
        self.users.write().await.push(user);
        Ok(id)
    }

    async fn insert_unique_user(
        &self,
        username: &str,
        password_hash: &str,
        profile: &Document,
    ) -> anyhow::Result<Option<Uuid>> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.credential.username == username) {
            return Ok(None);
        }
        let user = StoredUser::new(username, password_hash, profile);
        let id = user.credential.id;
        users.push(user);
        Ok(Some(id))
    }

    async fn find_user(&self, username: &str) -> anyhow::Result<Option<UserCredential>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.credential.username == username)
            .map(|u| u.credential.clone()))
    }
}

#[async_trait]
impl StudentStore for MemoryStore {
    async fn list_students(&self, owner: Uuid) -> anyhow::Result<Vec<StudentRecord>> {
        let students = self.students.read().await;
        Ok(students
            .iter()
            .filter(|s| s.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn insert_student(&self, owner: Uuid, fields: &Document) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        self.students.write().await.push(StudentRecord {
            id,
            owner_id: owner,
            fields: fields.clone(),
        });
        Ok(id)
    }

    async fn find_student(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<StudentRecord>> {
        let students = self.students.read().await;
        Ok(students
            .iter()
            .find(|s| s.id == id && s.owner_id == owner)
            .cloned())
    }

    async fn update_student(
        &self,
        owner: Uuid,
        id: Uuid,
        fields: &Document,
    ) -> anyhow::Result<bool> {
        let mut students = self.students.write().await;
        match students
            .iter_mut()
            .find(|s| s.id == id && s.owner_id == owner)
        {
            Some(student) => {
                for (key, value) in fields {
                    student.fields.insert(key.clone(), value.clone());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_student(&self, owner: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let mut students = self.students.write().await;
        let before = students.len();
        students.retain(|s| !(s.id == id && s.owner_id == owner));
        Ok(students.len() < before)
    }
}
