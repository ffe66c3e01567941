#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::tap::{JobPhase, TapService};
    use mockito::{Matcher, Server};
    use reqwest::Client;
    use std::time::Duration;

    const VOTABLE_OK: &str = r#"<VOTABLE version="1.3"><RESOURCE type="results">
        <INFO name="QUERY_STATUS" value="OK"/>
        <TABLE>
          <FIELD name="s" datatype="char" arraysize="*"/>
          <FIELD name="flux" datatype="double"/>
          <DATA><TABLEDATA>
            <TR><TD>a</TD><TD>1.5</TD></TR>
            <TR><TD>b</TD><TD>2.5</TD></TR>
          </TABLEDATA></DATA>
        </TABLE>
    </RESOURCE></VOTABLE>"#;

    // Builds a minimal UWS job document for job id 101.
    fn job_doc(phase: &str, extra: &str) -> String {
        format!(
            r#"<uws:job xmlns:uws="http://www.ivoa.net/xml/UWS/v1.0"
                       xmlns:xlink="http://www.w3.org/1999/xlink">
                 <uws:jobId>101</uws:jobId>
                 <uws:phase>{}</uws:phase>
                 <uws:executionDuration>0</uws:executionDuration>
                 {}
               </uws:job>"#,
            phase, extra
        )
    }

    fn form_matcher(query: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("REQUEST".into(), "doQuery".into()),
            Matcher::UrlEncoded("LANG".into(), "ADQL".into()),
            Matcher::UrlEncoded("QUERY".into(), query.into()),
        ])
    }

    #[tokio::test]
    async fn sync_query_returns_rows() {
        let mut server = Server::new_async().await;
        let query = "SELECT TOP 2 s, flux FROM mags";

        let mock = server
            .mock("POST", "/tap/sync")
            .match_body(form_matcher(query))
            .with_status(200)
            .with_header("content-type", "application/x-votable+xml")
            .with_body(VOTABLE_OK)
            .create_async()
            .await;

        let service = TapService::with_client(&format!("{}/tap", server.url()), Client::new());
        let results = service.run_sync(query).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(!results.overflowed());
        assert_eq!(results.get(1).unwrap().get_f64("flux").unwrap(), Some(2.5));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sync_query_sends_maxrec() {
        let mut server = Server::new_async().await;
        let query = "SELECT * FROM t";

        let mock = server
            .mock("POST", "/tap/sync")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("QUERY".into(), query.into()),
                Matcher::UrlEncoded("MAXREC".into(), "50".into()),
            ]))
            .with_status(200)
            .with_body(VOTABLE_OK)
            .create_async()
            .await;

        let service = TapService::with_client(&format!("{}/tap", server.url()), Client::new());
        service.run_sync_with(query, Some(50)).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sync_query_surfaces_service_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/tap/sync")
            .with_status(200)
            .with_body(
                r#"<VOTABLE><RESOURCE>
                     <INFO name="QUERY_STATUS" value="ERROR">Column 'flx' not found</INFO>
                   </RESOURCE></VOTABLE>"#,
            )
            .create_async()
            .await;

        let service = TapService::with_client(&format!("{}/tap", server.url()), Client::new());
        let err = service.run_sync("SELECT flx FROM mags").await.unwrap_err();
        assert!(matches!(err, Error::Service(message) if message.contains("flx")));
    }

    #[tokio::test]
    async fn sync_query_flags_overflow() {
        let mut server = Server::new_async().await;
        let body = r#"<VOTABLE><RESOURCE>
            <INFO name="QUERY_STATUS" value="OK"/>
            <TABLE><FIELD name="x" datatype="int"/>
              <DATA><TABLEDATA><TR><TD>1</TD></TR></TABLEDATA></DATA>
            </TABLE>
            <INFO name="QUERY_STATUS" value="OVERFLOW"/>
        </RESOURCE></VOTABLE>"#;
        let _mock = server
            .mock("POST", "/tap/sync")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let service = TapService::with_client(&format!("{}/tap", server.url()), Client::new());
        let results = service.run_sync_with("SELECT x FROM t", Some(1)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results.overflowed());
    }

    #[tokio::test]
    async fn sync_query_maps_http_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/tap/sync")
            .with_status(503)
            .create_async()
            .await;

        let service = TapService::with_client(&format!("{}/tap", server.url()), Client::new());
        let err = service.run_sync("SELECT 1").await.unwrap_err();
        assert!(matches!(err, Error::Status { status, .. } if status.as_u16() == 503));
    }

    #[tokio::test]
    async fn async_job_full_lifecycle() {
        let mut server = Server::new_async().await;
        let base = format!("{}/tap", server.url());
        let query = "SELECT TOP 2 s, flux FROM mags";

        // Submit: 303 to the job resource, which reports PENDING.
        let submit = server
            .mock("POST", "/tap/async")
            .match_body(form_matcher(query))
            .with_status(303)
            .with_header("Location", &format!("{}/tap/async/101", server.url()))
            .create_async()
            .await;
        let doc_pending = server
            .mock("GET", "/tap/async/101")
            .with_body(job_doc("PENDING", ""))
            .create_async()
            .await;

        let service = TapService::with_client(&base, Client::new());
        let mut job = service.submit(query).await.unwrap();
        assert_eq!(job.job_id(), "101");
        assert_eq!(job.phase(), JobPhase::Pending);
        assert_eq!(job.job_url(), format!("{}/tap/async/101", server.url()));
        submit.assert_async().await;

        // Run: the phase endpoint still says PENDING, the phase POST
        // redirects to the job document, which now reports EXECUTING.
        let phase_pending = server
            .mock("GET", "/tap/async/101/phase")
            .with_body("PENDING")
            .create_async()
            .await;
        let run = server
            .mock("POST", "/tap/async/101/phase")
            .match_body(Matcher::UrlEncoded("PHASE".into(), "RUN".into()))
            .with_status(303)
            .with_header("Location", &format!("{}/tap/async/101", server.url()))
            .create_async()
            .await;
        doc_pending.remove_async().await;
        let doc_executing = server
            .mock("GET", "/tap/async/101")
            .with_body(job_doc("EXECUTING", ""))
            .create_async()
            .await;

        job.run().await.unwrap();
        assert_eq!(job.phase(), JobPhase::Executing);
        run.assert_async().await;

        // Completion: swap the phase endpoint and job document, then wait.
        phase_pending.remove_async().await;
        doc_executing.remove_async().await;
        let _phase_completed = server
            .mock("GET", "/tap/async/101/phase")
            .with_body("COMPLETED")
            .create_async()
            .await;
        let _doc_completed = server
            .mock("GET", "/tap/async/101")
            .with_body(job_doc(
                "COMPLETED",
                r#"<uws:results><uws:result id="result" xlink:href="results/result"/></uws:results>"#,
            ))
            .create_async()
            .await;
        let result = server
            .mock("GET", "/tap/async/101/results/result")
            .with_body(VOTABLE_OK)
            .create_async()
            .await;

        let phase = job.wait().await.unwrap();
        assert_eq!(phase, JobPhase::Completed);

        let results = job.fetch_result().await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results.get(0).unwrap().get_str("s").unwrap(), Some("a"));
        result.assert_async().await;

        // Delete the job resource.
        let delete = server
            .mock("DELETE", "/tap/async/101")
            .with_status(204)
            .create_async()
            .await;
        job.delete().await.unwrap();
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn submit_accepts_in_place_response() {
        // Some servers answer the create with 200 and the job document
        // instead of a 303; the job URL is then derived from the job id.
        let mut server = Server::new_async().await;
        let _submit = server
            .mock("POST", "/tap/async")
            .with_status(200)
            .with_body(job_doc("PENDING", ""))
            .create_async()
            .await;

        let service = TapService::with_client(&format!("{}/tap", server.url()), Client::new());
        let job = service.submit("SELECT 1").await.unwrap();
        assert_eq!(job.job_url(), format!("{}/tap/async/101", server.url()));
    }

    #[tokio::test]
    async fn run_refuses_non_pending_job() {
        let mut server = Server::new_async().await;
        let _doc = server
            .mock("GET", "/tap/async/101")
            .with_body(job_doc("EXECUTING", ""))
            .create_async()
            .await;
        let _phase = server
            .mock("GET", "/tap/async/101/phase")
            .with_body("EXECUTING")
            .create_async()
            .await;

        let url = format!("{}/tap/async/101", server.url());
        let mut job = crate::tap::AsyncJob::attach(Client::new(), &url).await.unwrap();
        let err = job.run().await.unwrap_err();
        assert!(matches!(err, Error::WrongPhase { actual, .. } if actual == "EXECUTING"));
    }

    #[tokio::test]
    async fn abort_stops_an_executing_job() {
        let mut server = Server::new_async().await;
        let doc_executing = server
            .mock("GET", "/tap/async/101")
            .with_body(job_doc("EXECUTING", ""))
            .create_async()
            .await;
        let _phase = server
            .mock("GET", "/tap/async/101/phase")
            .with_body("EXECUTING")
            .create_async()
            .await;

        let url = format!("{}/tap/async/101", server.url());
        let mut job = crate::tap::AsyncJob::attach(Client::new(), &url).await.unwrap();

        let abort = server
            .mock("POST", "/tap/async/101/phase")
            .match_body(Matcher::UrlEncoded("PHASE".into(), "ABORT".into()))
            .with_status(303)
            .with_header("Location", &url)
            .create_async()
            .await;
        doc_executing.remove_async().await;
        let _doc_aborted = server
            .mock("GET", "/tap/async/101")
            .with_body(job_doc("ABORTED", ""))
            .create_async()
            .await;

        job.abort().await.unwrap();
        assert_eq!(job.phase(), JobPhase::Aborted);
        abort.assert_async().await;
    }

    #[tokio::test]
    async fn failed_job_surfaces_error_summary() {
        let mut server = Server::new_async().await;
        let error_extra = r#"<uws:errorSummary type="fatal" hasDetail="false">
            <uws:message>division by zero in query</uws:message>
        </uws:errorSummary>"#;
        let _doc = server
            .mock("GET", "/tap/async/101")
            .with_body(job_doc("ERROR", error_extra))
            .create_async()
            .await;

        let url = format!("{}/tap/async/101", server.url());
        let mut job = crate::tap::AsyncJob::attach(Client::new(), &url).await.unwrap();
        let err = job.fetch_result().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Job { message, error_type }
                if message.contains("division by zero") && error_type == "fatal"
        ));
    }

    #[tokio::test]
    async fn wait_timeout_gives_up_on_a_stuck_job() {
        let mut server = Server::new_async().await;
        let _doc = server
            .mock("GET", "/tap/async/101")
            .with_body(job_doc("EXECUTING", ""))
            .create_async()
            .await;
        let _phase = server
            .mock("GET", "/tap/async/101/phase")
            .with_body("EXECUTING")
            .create_async()
            .await;

        let url = format!("{}/tap/async/101", server.url());
        let mut job = crate::tap::AsyncJob::attach(Client::new(), &url).await.unwrap();
        let err = job.wait_timeout(Duration::from_millis(300)).await.unwrap_err();
        assert!(matches!(err, Error::JobTimeout(phase) if phase == "EXECUTING"));
    }

    #[tokio::test]
    async fn set_execution_duration_posts_to_subresource() {
        let mut server = Server::new_async().await;
        let url = format!("{}/tap/async/101", server.url());
        let _doc = server
            .mock("GET", "/tap/async/101")
            .with_body(job_doc("PENDING", ""))
            .create_async()
            .await;
        let update = server
            .mock("POST", "/tap/async/101/executionduration")
            .match_body(Matcher::UrlEncoded("EXECUTIONDURATION".into(), "600".into()))
            .with_status(303)
            .with_header("Location", &url)
            .create_async()
            .await;

        let mut job = crate::tap::AsyncJob::attach(Client::new(), &url).await.unwrap();
        job.set_execution_duration(600).await.unwrap();
        update.assert_async().await;
    }
}
