use mediator_bus::{build_topic, compute_binding_id};
use mediator_protocol::{
    problem_codes, BasicMessageProblemReport, BusBindResponse, BusOperation, BusPublishResponse,
};

use super::Session;

fn problem(code: &str, explain: impl Into<String>) -> BusOperation {
    BusOperation::ProblemReport(BasicMessageProblemReport {
        code: code.to_owned(),
        explain: explain.into(),
    })
}

pub(super) async fn handle(session: &mut Session, op: BusOperation) -> BusOperation {
    match op {
        BusOperation::Subscribe(sub) => {
            let Some(their_did) = session.their_did.clone() else {
                return problem(problem_codes::INVALID_REQUEST, "no pairwise DID bound to this session");
            };

            let mut cast = sub.cast.unwrap_or_default();
            if cast.thid.is_none() {
                cast.thid = sub.thid.clone();
            }

            let binding_id = match compute_binding_id(&cast) {
                Ok(id) => id,
                Err(err) => return problem(problem_codes::INVALID_CAST, err.to_string()),
            };

            let topic = build_topic(&their_did, &binding_id);
            if let Err(err) = session
                .subscriptions
                .subscribe(
                    &topic,
                    &binding_id,
                    sub.parent_thread_id.clone(),
                    session.bus_events_tx.clone(),
                )
                .await
            {
                return problem(problem_codes::INVALID_REQUEST, err.to_string());
            }

            BusOperation::BindResponse(BusBindResponse {
                binding_id,
                active: true,
                parent_thread_id: sub.parent_thread_id,
                aborted: None,
            })
        }
        BusOperation::Unsubscribe(unsub) => {
            let cancelled = if unsub.all {
                session.subscriptions.unsubscribe_all().await
            } else if let Some(parent) = &unsub.parent_thread_id {
                session.subscriptions.unsubscribe_by_parent(parent).await
            } else if let Some(binding_id) = &unsub.binding_id {
                if session.subscriptions.unsubscribe_one(binding_id).await {
                    vec![binding_id.clone()]
                } else {
                    vec![]
                }
            } else {
                vec![]
            };

            if unsub.need_answer {
                BusOperation::BindResponse(BusBindResponse {
                    binding_id: cancelled.into_iter().next().unwrap_or_default(),
                    active: false,
                    parent_thread_id: unsub.parent_thread_id,
                    aborted: Some(true),
                })
            } else {
                BusOperation::BindResponse(BusBindResponse {
                    binding_id: unsub.binding_id.unwrap_or_default(),
                    active: false,
                    parent_thread_id: None,
                    aborted: None,
                })
            }
        }
        BusOperation::Publish(publish) => {
            use base64::Engine;
            let decoded = base64::engine::general_purpose::STANDARD.decode(&publish.payload);
            match decoded {
                Ok(bytes) if !bytes.is_empty() => {
                    let Some(their_did) = session.their_did.clone() else {
                        return problem(problem_codes::INVALID_REQUEST, "no pairwise DID bound to this session");
                    };
                    let topics: Vec<String> = publish
                        .binding_id
                        .iter()
                        .map(|id| build_topic(&their_did, id))
                        .collect();
                    match session.state.bus.publish(&topics, &publish.payload).await {
                        Ok(recipients_num) => {
                            BusOperation::PublishResponse(BusPublishResponse { recipients_num })
                        }
                        Err(err) => problem(problem_codes::INVALID_REQUEST, err.to_string()),
                    }
                }
                _ => problem(problem_codes::EMPTY_PAYLOAD, "payload must be non-empty base64"),
            }
        }
        // Replies a session only ever emits itself, never receives.
        BusOperation::BindResponse(_)
        | BusOperation::Event(_)
        | BusOperation::PublishResponse(_)
        | BusOperation::ProblemReport(_) => {
            problem(problem_codes::INVALID_REQUEST, "unexpected bus reply from peer")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediator_protocol::CastDescriptor;

    #[test]
    fn problem_report_carries_the_given_code_and_explain() {
        let report = problem(problem_codes::EMPTY_PAYLOAD, "empty");
        match report {
            BusOperation::ProblemReport(report) => {
                assert_eq!(report.code, problem_codes::EMPTY_PAYLOAD);
                assert_eq!(report.explain, "empty");
            }
            other => panic!("expected problem report, got {other:?}"),
        }
    }

    #[test]
    fn cast_without_protocols_is_rejected_before_subscribing() {
        let cast = CastDescriptor {
            recipient_vk: Some("VK1".to_owned()),
            ..Default::default()
        };
        assert!(compute_binding_id(&cast).is_err());
    }
}
