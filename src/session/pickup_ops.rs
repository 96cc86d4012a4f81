use mediator_protocol::{problem_codes, BasicMessageProblemReport, PickupOperation};

use super::Session;

pub(super) async fn handle(session: &mut Session, op: PickupOperation) -> PickupOperation {
    let Some(endpoint_uid) = session.endpoint_uid.clone() else {
        return PickupOperation::ProblemReport(BasicMessageProblemReport {
            code: problem_codes::INVALID_REQUEST.to_owned(),
            explain: "no connection established yet".to_owned(),
        });
    };

    // Once a recipient speaks the pickup protocol, further queue-mode
    // deliveries for this session are redirected into the mailbox instead
    // of written straight to the wire (§5 outbound multiplexing).
    session.pickup_mode.store(true, std::sync::atomic::Ordering::Relaxed);

    let queue = session.state.pickup_queue(&endpoint_uid).await;
    queue.process(op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediator_pickup::PickupQueue;
    use mediator_protocol::PickupStatusRequest;

    #[tokio::test]
    async fn status_request_reports_empty_queue() {
        let queue = PickupQueue::new(None);
        let response = queue
            .process(PickupOperation::StatusRequest(PickupStatusRequest::default()))
            .await;
        match response {
            PickupOperation::StatusResponse(status) => assert_eq!(status.message_count, 0),
            other => panic!("expected status response, got {other:?}"),
        }
    }
}
