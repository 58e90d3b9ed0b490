//! Todo list backed by a [`LocalCollection`].

use moltis_protocol::monitor::Todo;

use crate::{
    collection::{CollectionChange, LocalCollection},
    error::Result,
    now_ms,
};

pub const TODOS_COLLECTION_ID: &str = "todos";

#[derive(Debug, Clone)]
pub struct TodoCollection {
    todos: LocalCollection<String, Todo>,
}

impl Default for TodoCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl TodoCollection {
    pub fn new() -> Self {
        Self {
            todos: LocalCollection::new(TODOS_COLLECTION_ID, |todo: &Todo| todo.id.clone()),
        }
    }

    /// Access to the underlying store for generic consumers.
    pub fn collection(&self) -> &LocalCollection<String, Todo> {
        &self.todos
    }

    /// Create an open todo. Surrounding whitespace is trimmed.
    pub fn add_todo(&self, text: impl AsRef<str>) -> Result<Todo> {
        let todo = Todo {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.as_ref().trim().to_string(),
            completed: false,
            created_at: now_ms(),
        };
        self.todos.insert(todo.clone())?;
        Ok(todo)
    }

    /// Flip `completed`. Returns the new value.
    pub fn toggle_todo(&self, id: &str) -> Result<bool> {
        let mut completed = false;
        self.todos.update(&id.to_string(), |todo| {
            todo.completed = !todo.completed;
            completed = todo.completed;
        })?;
        Ok(completed)
    }

    pub fn remove_todo(&self, id: &str) -> Result<Todo> {
        self.todos.delete(&id.to_string())
    }

    /// Drop every completed todo. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        self.todos.delete_where(|todo| todo.completed).len()
    }

    /// Todos in creation order.
    pub fn list(&self) -> Vec<Todo> {
        self.todos.snapshot()
    }

    pub fn remaining(&self) -> usize {
        self.todos.snapshot().iter().filter(|t| !t.completed).count()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CollectionChange<String>> {
        self.todos.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, crate::CollectionError};

    #[test]
    fn add_assigns_unique_ids_and_trims_text() {
        let todos = TodoCollection::new();
        let a = todos.add_todo("  buy milk ").unwrap();
        let b = todos.add_todo("buy milk").unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.text, "buy milk");
        assert!(!a.completed);
        assert_eq!(todos.list().len(), 2);
    }

    #[test]
    fn toggle_flips_completion() {
        let todos = TodoCollection::new();
        let todo = todos.add_todo("write tests").unwrap();
        assert!(todos.toggle_todo(&todo.id).unwrap());
        assert!(!todos.toggle_todo(&todo.id).unwrap());
        assert!(matches!(
            todos.toggle_todo("missing"),
            Err(CollectionError::NotFound { .. })
        ));
    }

    #[test]
    fn clear_completed_keeps_open_items() {
        let todos = TodoCollection::new();
        let done = todos.add_todo("done").unwrap();
        let open = todos.add_todo("open").unwrap();
        todos.toggle_todo(&done.id).unwrap();

        assert_eq!(todos.clear_completed(), 1);
        let left = todos.list();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, open.id);
        assert_eq!(todos.remaining(), 1);
    }

    #[test]
    fn remove_returns_the_todo() {
        let todos = TodoCollection::new();
        let todo = todos.add_todo("x").unwrap();
        assert_eq!(todos.remove_todo(&todo.id).unwrap(), todo);
        assert!(todos.remove_todo(&todo.id).is_err());
    }
}
