use crate::error::AgentError;
use crate::tools::ToolRegistry;
use crate::types::{StreamEvent, ToolCallRequest, ToolResult};

/// Executes tool calls against a registry. Every request yields exactly one
/// result; misses and failures become error results instead of aborting.
pub struct Dispatcher;

impl Dispatcher {
    /// Run `requests` one after another, in order.
    pub async fn dispatch(requests: &[ToolCallRequest], registry: &ToolRegistry) -> Vec<ToolResult> {
        Self::dispatch_with(requests, registry, |_| true, |_| {}).await
    }

    /// [`Dispatcher::dispatch`] with a per-call `approve` check. Refused calls
    /// get a rejection result. `observe` sees a `ToolStart` and a `ToolEnd`
    /// for every request, approved or not.
    pub async fn dispatch_with<A, O>(
        requests: &[ToolCallRequest],
        registry: &ToolRegistry,
        mut approve: A,
        mut observe: O,
    ) -> Vec<ToolResult>
    where
        A: FnMut(&ToolCallRequest) -> bool,
        O: FnMut(&StreamEvent),
    {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let approved = approve(request);
            observe(&StreamEvent::ToolStart {
                name: request.name.clone(),
                arguments: request.arguments.clone(),
            });

            let result = if approved {
                Self::invoke(request, registry).await
            } else {
                tracing::info!(tool = %request.name, "tool call rejected");
                Self::rejected(request)
            };

            observe(&StreamEvent::ToolEnd {
                name: request.name.clone(),
                output: result.text.clone(),
            });
            results.push(result);
        }
        results
    }

    pub async fn invoke(request: &ToolCallRequest, registry: &ToolRegistry) -> ToolResult {
        let Some(tool) = registry.get(&request.name) else {
            let error = AgentError::ToolNotFound {
                name: request.name.clone(),
            };
            tracing::warn!(tool = %request.name, call_id = %request.id, "{error}");
            return ToolResult::error(request, format!("Error: {error}"));
        };

        tracing::info!(tool = %request.name, call_id = %request.id, "dispatching tool call");
        let arguments = request.arguments.clone();
        let outcome = tokio::task::spawn_blocking(move || tool.invoke(&arguments)).await;

        match outcome {
            Ok(Ok(output)) => ToolResult::success(request, output),
            Ok(Err(source)) => {
                let error = AgentError::ToolExecution {
                    name: request.name.clone(),
                    source,
                };
                tracing::warn!(tool = %request.name, call_id = %request.id, "{error}");
                ToolResult::error(request, format!("Error: {error}"))
            }
            Err(join_error) => {
                tracing::warn!(tool = %request.name, call_id = %request.id, "tool task failed: {join_error}");
                ToolResult::error(
                    request,
                    format!("Error: tool '{}' did not complete: {join_error}", request.name),
                )
            }
        }
    }

    /// Result recorded for a call the confirmation gate refused.
    pub fn rejected(request: &ToolCallRequest) -> ToolResult {
        ToolResult::error(
            request,
            format!("Error: tool call '{}' was rejected by the user", request.name),
        )
    }
}
