use huefy::{
    BulkEmailRequest, Client, Error, Provider, RequestContext, SendEmailRequest,
};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let client = Client::from_env()?;

    let health = client.health_check().await?;
    println!("API is {} (checked at {})", health.status, health.timestamp);

    let request = SendEmailRequest::new(
        "welcome-email",
        json!({ "name": "John Doe", "company": "Acme Corp" }),
        "john@example.com",
        None,
    )?;

    let ctx = RequestContext::new().with_timeout(Duration::from_secs(5));
    match client.send_email_with_context(&request, &ctx).await {
        Ok(sent) => println!("Sent {} via {} ({})", sent.message_id, sent.provider, sent.status),
        Err(Error::TemplateNotFound { template_key, .. }) => {
            eprintln!("Template '{template_key}' not found");
        }
        Err(Error::InvalidTemplateData {
            validation_errors, ..
        }) => {
            eprintln!("Invalid template data: {validation_errors:?}");
        }
        Err(Error::RateLimit { retry_after, .. }) => {
            eprintln!("Rate limited, retry after {retry_after:?}");
        }
        Err(Error::Provider {
            provider,
            provider_code,
            message,
            ..
        }) => {
            eprintln!("Provider {provider:?} error [{provider_code:?}]: {message}");
        }
        Err(Error::Cancelled { reason }) => eprintln!("Gave up: {reason}"),
        Err(err) => eprintln!("Send failed [{}]: {}", err.code(), err.message()),
    }

    let batch = BulkEmailRequest::new([
        SendEmailRequest::builder()
            .template_key("welcome-email")
            .data(json!({ "name": "Jane Smith", "company": "Tech Solutions Inc" }))
            .recipient("jane.smith@techsolutions.com")
            .provider(Provider::SendGrid),
        SendEmailRequest::builder()
            .template_key("newsletter")
            .data(json!({ "name": "Bob Johnson", "newsletter": "Weekly Tech Update" }))
            .recipient("bob.johnson@startup.io"),
    ])?;

    let results = client.send_bulk_emails(&batch).await?;
    for (email, outcome) in batch.emails().iter().zip(results.items()) {
        match outcome {
            Ok(sent) => println!("{}: sent as {}", email.recipient(), sent.message_id),
            Err(err) => println!("{}: failed [{}] {}", email.recipient(), err.code(), err.message()),
        }
    }
    println!(
        "{} of {} emails sent",
        results.success_count(),
        results.total()
    );

    Ok(())
}
