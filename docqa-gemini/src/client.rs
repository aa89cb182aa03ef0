//! Thin HTTP client for the Gemini REST API.

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::{
    Client, ClientBuilder, RequestBuilder, Response,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use snafu::ResultExt;
use tracing::{Level, Span, instrument};
use url::Url;

use crate::error::*;
use crate::model::{
    BatchContentEmbeddingResponse, BatchEmbedContentsRequest, ContentEmbeddingResponse,
    EmbedContentRequest, GenerateContentRequest, GenerationResponse, Model,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Environment variables checked, in order, for an API key.
pub const API_KEY_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// HTTP client for the Gemini REST API.
///
/// A client built without a key is valid: every request fails with
/// [`GeminiError::MissingApiKey`], which callers treat as degraded operation.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http_client: Client,
    base_url: Url,
    has_key: bool,
}

impl GeminiClient {
    /// Create a client for the public endpoint.
    pub fn new(api_key: Option<&str>) -> Result<Self, GeminiError> {
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .context(ConstructUrlSnafu { suffix: DEFAULT_BASE_URL.to_string() })?;
        Self::with_base_url(Client::builder(), api_key, base_url)
    }

    /// Create a client from `GOOGLE_API_KEY` or `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self, GeminiError> {
        let key = API_KEY_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|key| !key.trim().is_empty());
        Self::new(key.as_deref())
    }

    /// Create a client with custom HTTP settings and base URL.
    pub fn with_base_url(
        client_builder: ClientBuilder,
        api_key: Option<&str>,
        base_url: Url,
    ) -> Result<Self, GeminiError> {
        let api_key = api_key.map(str::trim).filter(|k| !k.is_empty());
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                HeaderName::from_static("x-goog-api-key"),
                HeaderValue::from_str(key).context(InvalidApiKeySnafu)?,
            );
        }
        let http_client =
            client_builder.default_headers(headers).build().context(BuildClientSnafu)?;
        Ok(Self { http_client, base_url, has_key: api_key.is_some() })
    }

    /// Whether the client was given an API key.
    pub fn has_api_key(&self) -> bool {
        self.has_key
    }

    /// Check the response status code and return an error if it is not successful
    #[instrument(skip_all, err)]
    async fn check_response(response: Response) -> Result<Response, GeminiError> {
        let status = response.status();
        if !status.is_success() {
            let description = response.text().await.ok();
            BadResponseSnafu { code: status.as_u16(), description }.fail()
        } else {
            Ok(response)
        }
    }

    /// Send a request and hand the successful response to `deserializer`.
    #[instrument(skip_all)]
    async fn perform_request<
        B: FnOnce(&Client) -> RequestBuilder,
        D: AsyncFn(Response) -> Result<T, GeminiError>,
        T,
    >(
        &self,
        builder: B,
        deserializer: D,
    ) -> Result<T, GeminiError> {
        if !self.has_key {
            return MissingApiKeySnafu.fail();
        }
        let request = builder(&self.http_client);
        let response = request.send().await.context(PerformRequestSnafu)?;
        tracing::debug!("response received");
        let response = Self::check_response(response).await?;
        deserializer(response).await
    }

    #[instrument(skip(self, body), fields(request.url = %url))]
    async fn post_json<Req: serde::Serialize, Res: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        body: &Req,
    ) -> Result<Res, GeminiError> {
        self.perform_request(
            |c| c.post(url).json(body),
            async |r| r.json().await.context(DecodeResponseSnafu),
        )
        .await
    }

    /// Generate content in one shot.
    #[instrument(skip_all, fields(
        model = %model,
        system.instruction.present = request.system_instruction.is_some(),
        usage.prompt_tokens,
        usage.candidates_tokens,
        usage.total_tokens,
    ), err)]
    pub async fn generate_content(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<GenerationResponse, GeminiError> {
        let url = self.build_url(model, "generateContent")?;
        let response: GenerationResponse = self.post_json(url, request).await?;

        if let Some(usage) = &response.usage_metadata {
            Span::current()
                .record("usage.prompt_tokens", usage.prompt_token_count)
                .record("usage.candidates_tokens", usage.candidates_token_count)
                .record("usage.total_tokens", usage.total_token_count);
        }

        Ok(response)
    }

    /// Generate content as a stream of incremental server-sent chunks.
    #[instrument(skip_all, fields(model = %model), err)]
    pub async fn generate_content_stream(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<impl Stream<Item = Result<GenerationResponse, GeminiError>> + Send + use<>, GeminiError>
    {
        let mut url = self.build_url(model, "streamGenerateContent")?;
        url.query_pairs_mut().append_pair("alt", "sse");

        let stream = self
            .perform_request(|c| c.post(url).json(request), async |r| Ok(r.bytes_stream()))
            .await?;

        Ok(stream
            .eventsource()
            .map(|event| event.context(BadPartSnafu))
            .map_ok(|event| {
                serde_json::from_str::<GenerationResponse>(&event.data).context(DeserializeSnafu)
            })
            .map(|r| r.and_then(|inner| inner)))
    }

    /// Embed a single text.
    #[instrument(skip_all, fields(model = %model, task.type = ?request.task_type))]
    pub async fn embed_content(
        &self,
        model: &Model,
        request: &EmbedContentRequest,
    ) -> Result<ContentEmbeddingResponse, GeminiError> {
        let url = self.build_url(model, "embedContent")?;
        self.post_json(url, request).await
    }

    /// Embed many texts in one call.
    #[instrument(skip_all, fields(model = %model, batch.size = request.requests.len()))]
    pub async fn embed_content_batch(
        &self,
        model: &Model,
        request: &BatchEmbedContentsRequest,
    ) -> Result<BatchContentEmbeddingResponse, GeminiError> {
        let url = self.build_url(model, "batchEmbedContents")?;
        self.post_json(url, request).await
    }

    #[instrument(skip(self), ret(level = Level::DEBUG))]
    fn build_url(&self, model: &Model, endpoint: &str) -> Result<Url, GeminiError> {
        let suffix = format!("{model}:{endpoint}");
        self.base_url.join(&suffix).context(ConstructUrlSnafu { suffix })
    }
}
