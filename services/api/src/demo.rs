use crate::infra::ChannelEventPublisher;
use clap::Args;
use setup_workflow::error::AppError;
use setup_workflow::workflows::review::{
    ActorId, ApplicationSubmission, DocumentKind, DocumentReference, InMemoryApplicationStore,
    RecordId, RecordSummary, ReforwardPolicy, ReviewDecision, ReviewWorkflowService, Role,
    RoleDirectory, TransitionRequest, WorkflowError,
};
use std::sync::Arc;

const PROPONENT: &str = "proponent-odiongan-bamboo";
const PSTO: &str = "psto-romblon";
const TNA: &str = "tna-romblon";
const DOST: &str = "dost-mimaropa";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Answer repeated forwards with the current record instead of an error
    #[arg(long)]
    pub(crate) acknowledge_reforward: bool,
    /// Print each application's audit trail as CSV
    #[arg(long)]
    pub(crate) csv: bool,
}

type DemoService = ReviewWorkflowService<InMemoryApplicationStore, RoleDirectory, ChannelEventPublisher>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        acknowledge_reforward,
        csv,
    } = args;

    let directory = RoleDirectory::new()
        .with_grant(PROPONENT, Role::Proponent)
        .with_grant(PSTO, Role::ProvincialReviewer)
        .with_grant(TNA, Role::AssessmentScheduler)
        .with_grant(DOST, Role::RegionalReviewer);
    let (publisher, mut notifications) = ChannelEventPublisher::channel();
    let policy = if acknowledge_reforward {
        ReforwardPolicy::Acknowledge
    } else {
        ReforwardPolicy::Reject
    };
    let service = ReviewWorkflowService::new(
        Arc::new(InMemoryApplicationStore::new()),
        Arc::new(directory),
        Arc::new(publisher),
    )
    .with_reforward_policy(policy);

    println!("SETUP review workflow demo (re-forward policy: {})", policy.label());

    println!("\nApplication 1: approval, assessment, and regional rejection");
    let first = submit(&service, "Odiongan Bamboo Furniture")?;
    step(
        "provincial review (approved)",
        service.review_by_provincial_office(
            &first,
            &as_actor(PSTO),
            ReviewDecision::Approved,
            Some("ok".to_string()),
        ),
    )?;
    expect_refusal(
        "forward before assessment",
        service.forward_to_regional_office(&first, &as_actor(PSTO)),
    );
    step(
        "assessment conducted",
        service.mark_assessment_conducted(&first, &as_actor(TNA)),
    )?;
    step(
        "assessment report submitted",
        service.submit_assessment_report(&first, &as_actor(TNA), "report-123"),
    )?;
    step(
        "forwarded to regional office",
        service.forward_to_regional_office(&first, &as_actor(PSTO)),
    )?;
    match service.forward_to_regional_office(&first, &as_actor(PSTO)) {
        Ok(summary) => println!(
            "  - repeated forward acknowledged at version {}",
            summary.version
        ),
        Err(err) => println!("  - repeated forward refused: {err}"),
    }
    step(
        "regional review (rejected)",
        service.review_by_regional_office(
            &first,
            &as_actor(DOST),
            ReviewDecision::Rejected,
            Some("insufficient capacity".to_string()),
        ),
    )?;
    expect_refusal(
        "forward after final decision",
        service.forward_to_regional_office(&first, &as_actor(PSTO)),
    );

    println!("\nApplication 2: returned for revision and resubmitted");
    let second = submit(&service, "Looc Seaweed Processors")?;
    step(
        "provincial review (returned)",
        service.review_by_provincial_office(
            &second,
            &as_actor(PSTO),
            ReviewDecision::Returned,
            Some("missing docs".to_string()),
        ),
    )?;
    expect_refusal(
        "resubmission by a reviewer",
        service.resubmit_after_return(&second, &as_actor(PSTO)),
    );
    step(
        "resubmitted by proponent",
        service.resubmit_after_return(&second, &as_actor(PROPONENT)),
    )?;

    for id in [first, second] {
        let record = service.get_application(&id)?;
        println!(
            "\n{} ({}) -> {} at version {}",
            record.application_id, record.enterprise_name, record.state, record.version
        );
        for entry in record.history.iter() {
            println!(
                "  #{} {} by {} ({}) -> {}{}",
                entry.version,
                entry.decision.label(),
                entry.actor,
                entry.role.label(),
                entry.resulting_state,
                entry
                    .comment
                    .as_deref()
                    .map(|comment| format!(" \"{comment}\""))
                    .unwrap_or_default()
            );
        }
        if csv {
            let mut buffer = Vec::new();
            record.history.write_csv(&mut buffer)?;
            println!("{}", String::from_utf8_lossy(&buffer));
        }
    }

    let mut delivered = 0;
    while notifications.try_recv().is_ok() {
        delivered += 1;
    }
    println!("\n{delivered} notifications dispatched");

    Ok(())
}

fn as_actor(id: &str) -> TransitionRequest {
    TransitionRequest::new(ActorId::new(id))
}

fn submit(service: &DemoService, enterprise: &str) -> Result<RecordId, AppError> {
    let slug = enterprise.to_ascii_lowercase().replace(' ', "-");
    let record = service.submit(
        &ActorId::new(PROPONENT),
        ApplicationSubmission {
            enterprise_name: enterprise.to_string(),
            documents: vec![DocumentReference {
                kind: DocumentKind::LetterOfIntent,
                name: "Letter of intent".to_string(),
                storage_key: format!("setup/{slug}/loi.pdf"),
            }],
        },
    )?;
    println!(
        "  - submitted {} -> {} (version {})",
        record.application_id, record.state, record.version
    );
    let listing = service.assign_reviewer(&record.id, &ActorId::new(PSTO), ActorId::new(PSTO))?;
    println!(
        "  - queued for {}",
        listing
            .assigned_reviewer
            .map(|reviewer| reviewer.to_string())
            .unwrap_or_default()
    );
    Ok(record.id)
}

fn step(label: &str, outcome: Result<RecordSummary, WorkflowError>) -> Result<(), AppError> {
    let summary = outcome?;
    println!(
        "  - {label} -> {} (version {})",
        summary.state, summary.version
    );
    Ok(())
}

fn expect_refusal(label: &str, outcome: Result<RecordSummary, WorkflowError>) {
    match outcome {
        Ok(summary) => println!("  - {label} unexpectedly succeeded -> {}", summary.state),
        Err(WorkflowError::GuardNotSatisfied(failure)) => {
            println!("  - {label} refused: guard {}", failure.code())
        }
        Err(err) => println!("  - {label} refused: {} ({err})", err.kind()),
    }
}
