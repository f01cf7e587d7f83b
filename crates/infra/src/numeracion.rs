//! Sequential document numbers (`REC-000001`, `SAL-000001`).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct Numerador {
    prefijo: String,
    ultimo: AtomicU64,
}

impl Numerador {
    pub fn new(prefijo: impl Into<String>) -> Self {
        Self {
            prefijo: prefijo.into(),
            ultimo: AtomicU64::new(0),
        }
    }

    pub fn siguiente(&self) -> String {
        let n = self.ultimo.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{n:06}", self.prefijo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn numbers_are_padded_and_sequential() {
        let n = Numerador::new("REC");
        assert_eq!(n.siguiente(), "REC-000001");
        assert_eq!(n.siguiente(), "REC-000002");
    }

    #[test]
    fn concurrent_callers_never_share_a_number() {
        let n = Arc::new(Numerador::new("SAL"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let n = Arc::clone(&n);
                thread::spawn(move || (0..50).map(|_| n.siguiente()).collect::<Vec<_>>())
            })
            .collect();
        let todos: HashSet<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(todos.len(), 200);
    }
}
