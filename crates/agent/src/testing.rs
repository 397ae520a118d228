use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::llm::LlmClient;

struct Route {
    marker: String,
    responses: VecDeque<Result<String, String>>,
    prompts: Vec<String>,
}

/// Language-model double that answers by prompt marker.
///
/// Each marker holds a queue of responses; the last one repeats once the
/// queue is drained. Prompts without a matching marker fail.
#[derive(Default)]
pub struct ScriptedLlmClient {
    routes: Mutex<Vec<Route>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, marker: &str, response: &str) -> Self {
        self.push(marker, Ok(response.to_string()))
    }

    pub fn failing(self, marker: &str, message: &str) -> Self {
        self.push(marker, Err(message.to_string()))
    }

    pub fn calls_for(&self, marker: &str) -> usize {
        self.prompts_for(marker).len()
    }

    pub fn prompts_for(&self, marker: &str) -> Vec<String> {
        let routes = self.routes.lock().expect("routes lock");
        routes
            .iter()
            .find(|route| route.marker == marker)
            .map(|route| route.prompts.clone())
            .unwrap_or_default()
    }

    fn push(mut self, marker: &str, response: Result<String, String>) -> Self {
        let routes = self.routes.get_mut().expect("routes lock");
        match routes.iter_mut().find(|route| route.marker == marker) {
            Some(route) => route.responses.push_back(response),
            None => routes.push(Route {
                marker: marker.to_string(),
                responses: VecDeque::from([response]),
                prompts: Vec::new(),
            }),
        }
        self
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut routes = self.routes.lock().map_err(|_| anyhow!("routes lock poisoned"))?;
        let route = routes
            .iter_mut()
            .find(|route| prompt.contains(&route.marker))
            .ok_or_else(|| anyhow!("no scripted response for prompt"))?;
        route.prompts.push(prompt.to_string());

        let response = if route.responses.len() > 1 {
            route.responses.pop_front()
        } else {
            route.responses.front().cloned()
        };
        match response {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted route `{}` is empty", route.marker)),
        }
    }
}
